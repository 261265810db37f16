//! Serialisation of compiled actions and the files written from the model

pub mod artifacts;
pub mod merge;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use crate::compiler::actions::{Action, ActionMode};
use crate::{Error, Result};

pub use artifacts::write_artifacts;
pub use merge::merge_action_array;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Serialise `actions`, in order, as an `action-array` element
pub fn write_action_array(actions: &[Action]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    start(&mut writer, "action-array")?;
    for action in actions {
        write_action(&mut writer, action)?;
    }
    end(&mut writer, "action-array")?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_action(writer: &mut XmlWriter, action: &Action) -> Result<()> {
    start(writer, "action")?;
    string_field(writer, "id", &action.id)?;
    for (name, value) in &action.fields {
        string_field(writer, name, value)?;
    }

    start_field(writer, "actionModes")?;
    start(writer, "actionMode-array")?;
    for mode in &action.modes {
        write_mode(writer, mode)?;
    }
    end(writer, "actionMode-array")?;
    end(writer, "field")?;

    end(writer, "action")
}

fn write_mode(writer: &mut XmlWriter, mode: &ActionMode) -> Result<()> {
    start(writer, "actionMode")?;
    string_field(writer, "xpathCondition", &mode.condition)?;

    start_field(writer, "argValues")?;
    start(writer, "map")?;
    for (name, value) in &mode.arguments {
        start(writer, "entry")?;
        string(writer, name)?;
        string(writer, value)?;
        end(writer, "entry")?;
    }
    end(writer, "map")?;
    end(writer, "field")?;

    string_field(writer, "operationID", mode.operation.id())?;
    end(writer, "actionMode")
}

/// `<field name="..."><String>...</String></field>`
fn string_field(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    start_field(writer, name)?;
    string(writer, value)?;
    end(writer, "field")
}

fn start_field(writer: &mut XmlWriter, name: &str) -> Result<()> {
    let mut field = BytesStart::new("field");
    field.push_attribute(("name", name));
    emit(writer, Event::Start(field))
}

fn string(writer: &mut XmlWriter, value: &str) -> Result<()> {
    start(writer, "String")?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    end(writer, "String")
}

fn start(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    emit(writer, Event::Start(BytesStart::new(tag)))
}

fn end(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    emit(writer, Event::End(BytesEnd::new(tag)))
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Xml(e.into()))
}
