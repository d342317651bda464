//! # Optimizer Module
//!
//! Il motore di ottimizzazione al momento della pubblicazione, separato in sottomoduli:
//! - `runner`: Esecuzione del tool esterno su file temporanei e scelta del risultato più piccolo
//! - `interceptor`: Decoratore del target reale, decide quando ottimizzare e cosa pubblicare
//! - `deletion`: Rimozione deduplicata delle relazioni quando un asset viene cancellato
//! - `registry`: Raccolta delle istanze per il commit di fine richiesta

pub mod deletion;
pub mod interceptor;
pub mod registry;
pub mod runner;

pub use deletion::DeletionCoordinator;
pub use interceptor::{PublishInterceptor, PublishOutcome};
pub use registry::TargetRegistry;
pub use runner::{OptimizationResult, OptimizerRunner};
