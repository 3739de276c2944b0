//! Reusable conformance suites for mlgraph kernel backends.
//!
//! Every suite function is generic over the backend and exercises the
//! engine end to end through it: numeric fixtures, compute-time validation,
//! and resource accounting. A backend crate instantiates the whole set with
//! [`define_backend_tests!`].

pub mod counting;
pub mod suites;

#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            // The constructor expression is written at the call site; pull
            // that scope in so its imports resolve here.
            use super::*;

            use $crate::suites::{compute, resources, validation};

            #[test]
            fn compute_matmul_then_add_matches_expected() {
                compute::matmul_then_add_matches_expected(&($backend_ctor)());
            }

            #[test]
            fn compute_matmul_resolves_dynamic_dimensions() {
                compute::matmul_resolves_dynamic_dimensions(&($backend_ctor)());
            }

            #[test]
            fn compute_transpose_moves_elements() {
                compute::transpose_moves_elements(&($backend_ctor)());
            }

            #[test]
            fn compute_subset_outputs_return_only_requested() {
                compute::subset_outputs_return_only_requested(&($backend_ctor)());
            }

            #[test]
            fn compute_repeated_calls_do_not_alias() {
                compute::repeated_calls_do_not_alias(&($backend_ctor)());
            }

            #[test]
            fn compute_gru_matches_reference_values() {
                compute::gru_matches_reference_values(&($backend_ctor)());
            }

            #[test]
            fn compute_gru_returns_step_sequence() {
                compute::gru_returns_step_sequence(&($backend_ctor)());
            }

            #[test]
            fn validation_empty_input_map_is_missing_inputs() {
                validation::empty_input_map_is_missing_inputs(&($backend_ctor)());
            }

            #[test]
            fn validation_missing_input_key_is_missing_inputs() {
                validation::missing_input_key_is_missing_inputs(&($backend_ctor)());
            }

            #[test]
            fn validation_unknown_input_key_is_unknown_name() {
                validation::unknown_input_key_is_unknown_name(&($backend_ctor)());
            }

            #[test]
            fn validation_unknown_output_key_is_unknown_name() {
                validation::unknown_output_key_is_unknown_name(&($backend_ctor)());
            }

            #[test]
            fn validation_dynamic_input_without_dimensions_is_unresolved() {
                validation::dynamic_input_without_dimensions_is_unresolved(&($backend_ctor)());
            }

            #[test]
            fn validation_wrong_dtype_binding_is_shape_mismatch() {
                validation::wrong_dtype_binding_is_shape_mismatch(&($backend_ctor)());
            }

            #[test]
            fn validation_contradicting_dimensions_are_shape_mismatch() {
                validation::contradicting_dimensions_are_shape_mismatch(&($backend_ctor)());
            }

            #[test]
            fn validation_wrong_rank_dimensions_are_shape_mismatch() {
                validation::wrong_rank_dimensions_are_shape_mismatch(&($backend_ctor)());
            }

            #[test]
            fn validation_wrong_length_output_buffer_is_output_mismatch() {
                validation::wrong_length_output_buffer_is_output_mismatch(&($backend_ctor)());
            }

            #[test]
            fn resources_dispose_restores_baseline() {
                resources::dispose_restores_baseline(&($backend_ctor)());
            }

            #[test]
            fn resources_drop_releases_like_dispose() {
                resources::drop_releases_like_dispose(&($backend_ctor)());
            }
        }
    };
}
