// Core module of the addon builder
pub mod compiler;
pub mod config;
pub mod logging;
pub mod model;
pub mod output;
pub mod parser;
pub mod widgets;

use log::info;
use std::path::PathBuf;
use std::time::Instant;

use compiler::ids::IdGenerator;
use compiler::Compiler;
use config::CompilerConfig;
use model::CompilationModel;
use output::artifacts::{read_file, write_file};
use output::{merge_action_array, write_artifacts};

/// Version of the addon builder
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export of common types for convenience
pub mod prelude {
    pub use crate::compiler::actions::{Action, ActionMode, Operation, SimpleAction};
    pub use crate::compiler::ids::IdGenerator;
    pub use crate::compiler::{CompilationOutput, Compiler, Directive};
    pub use crate::config::CompilerConfig;
    pub use crate::model::{CompilationModel, Dialog, ObserverConnection, ObserverOptions};
    pub use crate::parser::{Module, Node, NodeKind, ParseError, XQueryParser};
    pub use crate::widgets::{PropertyValue, WidgetDescriptor};
    pub use crate::{compile_addon, compile_addon_with_ids, Error, Result};
}

/// Compile the addon described by `config`: merge its actions into the
/// framework descriptor and write the auxiliary artifacts
pub fn compile_addon(config: &CompilerConfig) -> Result<CompilationModel> {
    compile_addon_with_ids(config, IdGenerator::from_entropy())
}

/// [`compile_addon`] with an explicit identifier source
pub fn compile_addon_with_ids(config: &CompilerConfig, ids: IdGenerator) -> Result<CompilationModel> {
    let started = Instant::now();
    config.validate()?;

    let source = read_file(&config.source_path())?;
    let source = source.strip_prefix('\u{feff}').unwrap_or(&source);

    let output = Compiler::with_ids(ids)
        .with_tree_template(config.tree_template_path())
        .compile_source(source)?;
    info!(
        "compiled {} actions from {} in {:?}",
        output.actions.len(),
        config.source_path().display(),
        started.elapsed()
    );

    // everything that can fail on input is checked before the first write
    let descriptor_path = config.descriptor_path();
    let descriptor = read_file(&descriptor_path)?;
    let merged = merge_action_array(&descriptor, &output.action_array)?;

    write_file(&descriptor_path, &merged)?;
    write_artifacts(&output.model, &config.target_dir)?;

    info!(
        "updated {} in {:?}",
        descriptor_path.display(),
        started.elapsed()
    );
    Ok(output.model)
}

/// Errors that can occur while compiling an addon
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error: {0}")]
    Parse(#[from] parser::ParseError),

    #[error("template '{0}' is declared more than once")]
    DuplicateTemplate(String),

    #[error("template '{template}': invalid markup: {message}")]
    Markup { template: String, message: String },

    #[error("framework descriptor: {0}")]
    Descriptor(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
