//! Process-wide generator for callers that do not carry their own handle.
//!
//! # Invariants
//! - Exactly one generator backs `generate_id` for the process lifetime.
//! - Concurrent first callers construct at most one instance.

use super::generator::{IdGenerator, IdResult};
use log::{info, warn};
use once_cell::sync::OnceCell;

static GLOBAL_GENERATOR: OnceCell<IdGenerator> = OnceCell::new();

/// Installs the process-wide generator with an explicit machine id.
///
/// Returns `Ok(true)` when installed and `Ok(false)` when a generator was
/// already in place; the existing instance keeps its machine id.
///
/// # Errors
/// - `IdError::InvalidConfiguration` when `machine_id` is out of range.
pub fn init_global_generator(machine_id: u16) -> IdResult<bool> {
    let generator = IdGenerator::new(machine_id)?;
    match GLOBAL_GENERATOR.set(generator) {
        Ok(()) => {
            info!(
                "event=id_generator_init module=id status=ok machine_id={}",
                machine_id
            );
            Ok(true)
        }
        Err(_) => {
            warn!(
                "event=id_generator_init module=id status=skipped requested_machine_id={} active_machine_id={}",
                machine_id,
                global_generator().machine_id()
            );
            Ok(false)
        }
    }
}

/// Returns the process-wide generator, building a default one on first use.
pub fn global_generator() -> &'static IdGenerator {
    GLOBAL_GENERATOR.get_or_init(IdGenerator::with_default_machine_id)
}

/// Mints an id from the process-wide generator.
pub fn generate_id() -> IdResult<u64> {
    global_generator().next_id()
}
