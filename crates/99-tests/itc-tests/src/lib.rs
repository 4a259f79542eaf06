//! Cross-crate end-to-end tests for the ITC toolkit.

#[cfg(all(test, not(target_arch = "wasm32")))]
mod native_e2e;
