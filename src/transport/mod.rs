/// Adopting connected socket descriptors.
#[cfg(unix)]
pub mod tcp;
