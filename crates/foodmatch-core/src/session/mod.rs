//! Session lifecycle management.
//!
//! ## Lifecycle
//!
//! ```text
//! create_session
//!   │
//!   ├─► Validate parameters and location
//!   ├─► Search places (bounded by the provider timeout)
//!   └─► Store Session { cursor: 0, members: {}, agreements: [] }
//!
//! During Session
//!   │
//!   ├─► join            add a member (idempotent)
//!   ├─► advance         move the shared cursor, stop at Exhausted
//!   ├─► vote            like / withdraw a like (members only)
//!   └─► update_parameters
//!         re-search, replace candidates, cursor back to 0
//!
//! Consensus (any time, read-only)
//!   │
//!   ├─► consensus        places liked by every member
//!   └─► agreement_scores ranked list with percentages
//! ```

mod engine;
mod store;

pub use engine::*;
pub use store::*;
