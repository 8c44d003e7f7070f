//! Server half of trellis: renders nested layouts and pages into fragment
//! stacks, assembles them into documents and answers the client runtime's
//! navigation requests.

pub mod app;
pub mod assemble;
pub mod component;
pub mod config;
pub mod error;
pub mod handler;
mod markup;
mod navigation;
pub mod registry;
pub mod render;
pub mod request;
pub mod router;
pub mod server;
mod static_files;
pub mod telemetry;

pub use app::App;
pub use assemble::{AssemblyOptions, DEFAULT_TEMPLATE, assemble_page};
pub use component::{
    Component, DefinitionKey, FnComponent, FragmentSpec, Markup, RenderContext, Rendered,
};
pub use config::TrellisConfig;
pub use error::{Error, Result};
pub use handler::{EndpointHandler, Hook, HookOutcome, PageHandler, hook, sequence};
pub use registry::ComponentRegistry;
pub use render::{PageDescriptor, PageOutput, PageRenderer};
pub use request::RequestEvent;
pub use trellis_protocol as protocol;
