//! The trellis browser runtime.
//!
//! A server-rendered page is a stack of fragments (layouts, then the page),
//! each a head range between two comments plus a `<trellis-frag>` body
//! wrapper nested in its parent's slot. [`FragmentManager`] keeps the ledger
//! of those fragments and [`Navigator`] moves between pages by replacing
//! only the fragments past the prefix both pages share. Everything outside
//! `web` is plain Rust over the [`FragmentDom`] and [`Platform`] seams.

pub mod dom;
pub mod error;
pub mod island;
pub mod manager;
pub mod navigation;
pub mod platform;
pub mod store;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use dom::{BuiltFragment, FragmentDom};
pub use error::{ClientError, Result};
pub use island::{ComponentInstance, IslandActivation, IslandSpec, IslandState, Trigger};
pub use manager::{CreatedFragments, FragmentBounds, FragmentManager};
pub use navigation::{GotoOptions, MAX_REDIRECTS, NavigationOutcome, Navigator, navigation_url};
pub use platform::{HistoryState, Platform};
pub use store::{NavigatingData, PageData, Store, Subscription};
pub use trellis_protocol as protocol;
