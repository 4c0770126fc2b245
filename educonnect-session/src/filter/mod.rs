//! Course search filter state.
//!
//! [`FilterState`] is the value: the filter fields plus the page, with a
//! lossless query-string projection. [`FilterStateController`] owns the live
//! state, debounces search edits and publishes every effective change as a
//! [`FilterQuery`].

mod controller;
mod state;

pub use controller::{FilterQuery, FilterStateController};
pub use state::{COURSES_NAMESPACE, DEFAULT_ORDERING, FIRST_PAGE, FilterChange, FilterState};
