//! # Server templates: manifest, materialisation, discovery.
//!
//! A template is a directory plus manifest that can be cloned to produce a
//! runnable working directory for a dynamic server.
//!
//! - [`TemplateMetadata`] — manifest model (`template.yml`) with defaults
//! - [`Template`] — a validated template; [`Template::clone_to`] materialises it
//! - [`TemplateStore`] — discovery, case-insensitive lookup, reload, scaffolding

mod metadata;
mod store;
mod template;

pub use metadata::{TemplateMetadata, MANIFEST_FILE};
pub use store::TemplateStore;
pub use template::{Template, OVERRIDE_MAX_PLAYERS, OVERRIDE_PORT, OVERRIDE_SERVER_ID};

pub(crate) use template::find_server_artifact;
