//! Intentionally empty: this crate only hosts cross-service tests.
