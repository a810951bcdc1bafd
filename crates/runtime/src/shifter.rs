//! The stack shifter (spec §4.4, component C10): grow a stack geometrically
//! when it nears capacity, keeping every index-valued reference into it
//! consistent afterward.
//!
//! Addressing the stacks by `Vec` index rather than raw pointer (Design
//! Notes) turns the source's interior-pointer relocation into a no-op:
//! `Vec::reserve`/`Vec::extend` may move the backing allocation, but every
//! reference into it is already an index, not a pointer, so nothing needs
//! rewriting. What's left to port is the *policy* — when to grow, by how
//! much, and the `resource_error` thrown when a configured ceiling is hit.

use crate::config::EngineConfig;
use crate::error::Exception;

/// Growth factor applied each time a stack must grow (spec §4.4: "doubles,
/// capped by `max_*_words`").
const GROWTH_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Global,
    Local,
    Trail,
    Arg,
}

impl StackKind {
    fn resource_name(self) -> &'static str {
        match self {
            StackKind::Global => "global_stack",
            StackKind::Local => "local_stack",
            StackKind::Trail => "trail_stack",
            StackKind::Arg => "argument_stack",
        }
    }
}

/// Compute the next capacity for a stack currently holding `used` words out
/// of `capacity`, or fail with a `resource_error` if growth would exceed
/// the configured ceiling.
pub fn next_capacity(
    kind: StackKind,
    used: usize,
    capacity: usize,
    config: &EngineConfig,
) -> Result<usize, Exception> {
    if used * 4 < capacity * 3 {
        // Below the 75% high-water mark; no growth needed yet.
        return Ok(capacity);
    }
    let grown = ((capacity.max(1) as f64) * GROWTH_FACTOR).ceil() as usize;
    let ceiling = config.max_stack_words as usize;
    if ceiling != 0 && grown > ceiling {
        if capacity >= ceiling {
            return Err(Exception::ResourceError(kind.resource_name()));
        }
        return Ok(ceiling);
    }
    Ok(grown)
}

/// Ensure `vec` has room for at least one more element, growing it
/// according to `next_capacity`'s policy. Since every reference into the
/// backing storage is an index (not a pointer), reallocation here requires
/// no relocation pass over the rest of the engine's state.
pub fn ensure_capacity<T>(
    kind: StackKind,
    vec: &mut Vec<T>,
    config: &EngineConfig,
) -> Result<(), Exception> {
    if vec.len() < vec.capacity() {
        return Ok(());
    }
    let target = next_capacity(kind, vec.len(), vec.capacity(), config)?;
    if target <= vec.capacity() {
        return Err(Exception::ResourceError(kind.resource_name()));
    }
    vec.reserve(target - vec.len());
    tracing::debug!(?kind, new_capacity = target, "stack grown");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_geometrically_below_ceiling() {
        let config = EngineConfig::new();
        let next = next_capacity(StackKind::Global, 80, 100, &config).unwrap();
        assert!(next > 100);
    }

    #[test]
    fn stays_put_below_high_water_mark() {
        let config = EngineConfig::new();
        let next = next_capacity(StackKind::Global, 10, 100, &config).unwrap();
        assert_eq!(next, 100);
    }

    #[test]
    fn refuses_to_exceed_configured_ceiling() {
        let config = EngineConfig::new().with_stack_sizing(1024, 2048);
        let err = next_capacity(StackKind::Trail, 2048, 2048, &config).unwrap_err();
        assert!(matches!(err, Exception::ResourceError("trail_stack")));
    }
}
