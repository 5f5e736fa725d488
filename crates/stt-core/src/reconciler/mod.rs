mod service;

pub use service::Reconciler;
