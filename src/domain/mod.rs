//! Domain Layer - Core types for wallet sessions and cross-chain swaps
//!
//! Pure data and invariants with no I/O. Everything that talks to a wallet,
//! the backend or the push socket goes through the ports layer.

pub mod chain;
pub mod error_kind;
pub mod quote;
pub mod session;
pub mod swap_form;
pub mod ticket;

pub use chain::{ChainDescriptor, ChainId, ChainRegistry, RemoteChain};
pub use error_kind::ErrorKind;
pub use quote::Quote;
pub use session::{ProviderKind, Session, SessionSnapshot, SessionStatus};
pub use swap_form::SwapFormState;
pub use ticket::{LifecycleState, SwapTicket};
