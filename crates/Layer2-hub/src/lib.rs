//! distrual Hub - supervises a bounded pool of node processes
//!
//! ```text
//!              spawn / kill / send            stdin
//!  operator ─────────────────────────► Hub ─────────────► node N
//!     ▲                                 │                   │
//!     │ HubEvent                        │ per child:        │ stdout/stderr
//!     └──────── event channel ◄─────────┼── OutputRelay ◄───┘
//!                    ▲                  │── LifecycleMonitor (wait, drain, ExitEvent)
//!                    └── exit consumer ◄┘
//! ```
//!
//! - [`Hub`]: registry with lowest-free-id allocation and single exit path
//! - [`CallDispatcher`]: turns handshake addresses into `Command` envelopes
//! - [`AddressBook`]: addresses learned from `Init` envelopes
//! - [`HubEvent`]: output, envelopes and exits in per-child order

pub mod address;
pub mod child;
pub mod dispatcher;
pub mod event;
mod monitor;
pub mod registry;
mod relay;

pub use address::{reachable, AddressBook};
pub use child::{ChildInfo, ExitEvent, ExitOutcome, StreamKind};
pub use dispatcher::CallDispatcher;
pub use event::{HubEvent, HubEvents};
pub use registry::Hub;
