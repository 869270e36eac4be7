//! Runs the engine conformance suite against the in-memory reference
//! engine. Alternative backends get their own copy of this file.

use genji::engine::conformance;
use genji::MemoryEngine;

#[test]
fn memory_engine_passes_the_conformance_suite() {
    conformance::run_all(MemoryEngine::new);
}
