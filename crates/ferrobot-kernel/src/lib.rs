//! `ferrobot-kernel` – lifecycle orchestration.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`robot`] | [`Robot`]: ordered start with rollback, best-effort halt, user work |
//! | [`manager`] | [`Manager`]: robots, manager commands and the [`ApiService`] seam |
//! | [`work`] | [`WorkRegistry`]: robot-scoped `every` / `after` units |

pub mod manager;
pub mod robot;
pub mod work;

pub use manager::{ApiService, Manager};
pub use robot::{Robot, Work};
pub use work::{WorkKind, WorkRegistry, WorkUnitInfo};
