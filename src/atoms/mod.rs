// ── Atoms Layer ────────────────────────────────────────────────────────────
// Constants, error types, and the provider seam — no I/O lives here.
// Dependency rule: atoms modules never import from engine/ internals except
// the plain data types a trait signature needs.

pub mod constants;
pub mod error;
pub mod traits;
