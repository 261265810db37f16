//! Auxiliary files derived from the compilation model

use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::CompilationModel;
use crate::{Error, Result};

pub const OBSERVERS_FILE: &str = "observers.json";
pub const CONNECT_OBSERVERS_FILE: &str = "connect-observers.json";
pub const NODE_SELECTORS_FILE: &str = "node-selectors.json";
pub const ACTIONS_BY_NAME_FILE: &str = "actions-by-name.json";
pub const ACTIONS_BY_CLASS_FILE: &str = "actions-by-class.json";
pub const DATALISTS_FILE: &str = "datalists.json";
pub const DIALOGS_FILE: &str = "dialogs.json";
pub const ATTACHED_TEMPLATES_FILE: &str = "attached-templates.less";
pub const ACTIONS_LESS_FILE: &str = "actions.less";
pub const TREE_TEMPLATES_DIR: &str = "tree-templates";

/// Write every artifact of `model` into `target_dir`; returns the written paths
pub fn write_artifacts(model: &CompilationModel, target_dir: &Path) -> Result<Vec<PathBuf>> {
    create_dir(target_dir)?;
    let mut written = Vec::new();

    write_json(target_dir, OBSERVERS_FILE, &model.observers, &mut written)?;
    write_json(
        target_dir,
        CONNECT_OBSERVERS_FILE,
        &model.connect_observer_actions,
        &mut written,
    )?;
    write_json(target_dir, NODE_SELECTORS_FILE, &model.node_selectors, &mut written)?;
    write_json(target_dir, ACTIONS_BY_NAME_FILE, &model.actions_by_name, &mut written)?;
    write_json(target_dir, ACTIONS_BY_CLASS_FILE, &model.actions_by_class, &mut written)?;
    write_json(target_dir, DATALISTS_FILE, &model.datalists, &mut written)?;
    write_json(target_dir, DIALOGS_FILE, &model.dialogs, &mut written)?;

    for (name, contents) in [
        (ATTACHED_TEMPLATES_FILE, model.attached_templates_stylesheet()),
        (ACTIONS_LESS_FILE, model.less_stylesheet()),
    ] {
        let path = target_dir.join(name);
        write_file(&path, &contents)?;
        written.push(path);
    }

    if !model.tree_templates.is_empty() {
        let tree_dir = target_dir.join(TREE_TEMPLATES_DIR);
        create_dir(&tree_dir)?;
        for (id, template) in &model.tree_templates {
            let path = tree_dir.join(format!("{id}.xq"));
            write_file(&path, template)?;
            written.push(path);
        }
    }

    info!("wrote {} artifacts to {}", written.len(), target_dir.display());
    Ok(written)
}

fn write_json<T: Serialize>(
    dir: &Path,
    name: &str,
    value: &T,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let path = dir.join(name);
    write_file(&path, &serde_json::to_string_pretty(value)?)?;
    written.push(path);
    Ok(())
}

/// Write `contents` to `path`, naming the path on failure
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    debug!("writing {}", path.display());
    fs::write(path, contents).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a UTF-8 file, naming the path on failure
pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
