//! Compilation of addon sources.
//!
//! A [`Compiler`] parses a source, folds the prolog declarations into the
//! compilation model, then walks every function call once, in document order,
//! handing recognised directives to their handlers. Actions synthesised along
//! the way are queued and emitted after the declared ones.

pub mod actions;
pub mod directives;
pub mod expressions;
pub mod ids;

use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

use crate::model::CompilationModel;
use crate::output::write_action_array;
use crate::parser::{Module, PrologItem, XQueryParser};
use crate::widgets::TreeTemplate;
use crate::Result;

use actions::{Action, ActionQueues};
use expressions::render_markup;
use ids::IdGenerator;

pub use actions::{ActionMode, Operation, SimpleAction};
pub use directives::Directive;

/// Namespace every generated query declares first
pub const UA_NAMESPACE_DECLARATION: &str =
    "declare namespace ua = \"http://expath.org/ns/user-agent\"; ";

/// Result of compiling one source in memory
#[derive(Debug)]
pub struct CompilationOutput {
    pub model: CompilationModel,
    /// User-declared, then derived, then simple actions
    pub actions: Vec<Action>,
    /// Serialised `action-array` element
    pub action_array: String,
}

/// Compiles addon sources; one instance per compilation target
#[derive(Debug)]
pub struct Compiler {
    ids: IdGenerator,
    tree_template: TreeTemplate,
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_ids(IdGenerator::from_entropy())
    }

    /// Compiler minting identifiers from `ids`
    pub fn with_ids(ids: IdGenerator) -> Self {
        Self {
            ids,
            tree_template: TreeTemplate::default(),
        }
    }

    /// Location of the tree-generator template skeleton, read on first use
    pub fn with_tree_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.tree_template = TreeTemplate::new(path);
        self
    }

    pub fn compile_source(&mut self, source: &str) -> Result<CompilationOutput> {
        let started = Instant::now();
        let module = XQueryParser::parse(source)?;
        debug!("parsed source in {:?}", started.elapsed());

        let mut walk = Walk {
            source,
            model: CompilationModel::new(),
            actions: Vec::new(),
            queues: ActionQueues::default(),
            ids: &mut self.ids,
            tree_template: &mut self.tree_template,
        };
        walk.collect_prolog(&module);

        let calls = module.function_calls();
        for call in &calls {
            walk.dispatch(call)?;
        }
        info!(
            "walked {} function calls in {:?}",
            calls.len(),
            started.elapsed()
        );

        let Walk {
            model,
            actions,
            queues,
            ..
        } = walk;
        let actions = queues.drain_after(actions);
        let action_array = write_action_array(&actions)?;

        Ok(CompilationOutput {
            model,
            actions,
            action_array,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one walk over a parsed source
pub(crate) struct Walk<'a> {
    pub(crate) source: &'a str,
    pub(crate) model: CompilationModel,
    /// User-declared actions, in declaration order
    pub(crate) actions: Vec<Action>,
    pub(crate) queues: ActionQueues,
    pub(crate) ids: &'a mut IdGenerator,
    pub(crate) tree_template: &'a mut TreeTemplate,
}

impl Walk<'_> {
    /// Build the prolog text and record the variables templates may refer to
    fn collect_prolog(&mut self, module: &Module) {
        let mut prolog = String::from(UA_NAMESPACE_DECLARATION);

        for item in &module.prolog {
            if let PrologItem::NamespaceDecl { span, .. } = item {
                prolog.push_str(span.text(self.source).trim());
                prolog.push_str("; ");
            }
        }

        for decl in module.var_decls() {
            let text = match &decl.value {
                Some(value) => {
                    let processed = render_markup(
                        value,
                        self.source,
                        &self.model.variables,
                        &self.model.templates,
                    );
                    let declaration = format!(
                        "{}{}{}",
                        &self.source[decl.span.start..value.span.start],
                        processed,
                        &self.source[value.span.end..decl.span.end]
                    );

                    let recorded = decl.type_decl.as_deref().is_some_and(|type_decl| {
                        type_decl == "element()" || type_decl.ends_with("string")
                    });
                    if recorded {
                        self.model
                            .variables
                            .insert(format!("${}", decl.name), processed.trim().to_string());
                    }
                    declaration
                }
                None => decl.span.text(self.source).to_string(),
            };
            prolog.push_str(text.trim());
            prolog.push_str("; ");
        }

        debug!("prolog: {prolog}");
        self.model.prolog = prolog;
    }
}
