//! Local compile-validation of plugin binaries.
//!
//! Pushed Wasm is compiled by the runtime before it ever reaches the
//! registry, so a broken binary fails the push instead of the first
//! consumer who pulls it. One engine is shared across validations.

use wasmtime::{Engine, Module};

use crate::error::{Error, Result};

pub struct WasmValidator {
    engine: Engine,
}

impl WasmValidator {
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
        }
    }

    pub fn validate(&self, wasm: &[u8]) -> Result<()> {
        Module::validate(&self.engine, wasm).map_err(|e| Error::WasmCompile {
            message: e.to_string(),
        })
    }
}

impl Default for WasmValidator {
    fn default() -> Self {
        Self::new()
    }
}
