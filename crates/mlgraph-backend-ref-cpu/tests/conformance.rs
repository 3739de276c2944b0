use std::sync::Arc;

use mlgraph_backend_ref_cpu::CpuBackend;

mlgraph_backend_tests::define_backend_tests!(ref_cpu, || Arc::new(CpuBackend::new()));
