//! Runs the full conformance set through the counting wrapper, so the
//! delegating impl is held to the same contract as a real backend.

use std::sync::Arc;

use mlgraph_backend_ref_cpu::CpuBackend;
use mlgraph_backend_tests::counting::CountingBackend;

mlgraph_backend_tests::define_backend_tests!(counting_cpu, || {
    Arc::new(CountingBackend::new(Arc::new(CpuBackend::new())))
});
