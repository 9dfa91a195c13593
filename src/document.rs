//! Filling PDF prescription forms.
//!
//! A template carries an interactive form whose text fields are named after
//! the prescription fields (`patient_name`, `drug1_name`, ...). Filling sets
//! each named field's value and locks every field read-only, so the result
//! is a finished document rather than an editable form.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Form field flag bit 1: the field is read-only.
const READ_ONLY: i64 = 1;

/// Errors from filling a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("template has no interactive form")]
    NoForm,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Something that fills a document template from a flat field map.
pub trait DocumentFiller: Send + Sync + std::fmt::Debug {
    /// Fill `fields` into the template and return the finished document.
    ///
    /// Names the template does not contain are skipped.
    fn fill(&self, fields: &BTreeMap<String, String>) -> Result<Vec<u8>, DocumentError>;
}

/// Fills the AcroForm text fields of a PDF template.
#[derive(Clone)]
pub struct PdfFormFiller {
    template: Vec<u8>,
}

impl std::fmt::Debug for PdfFormFiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfFormFiller")
            .field("template_bytes", &self.template.len())
            .finish()
    }
}

impl PdfFormFiller {
    /// Use the template at `path`. It is read once and parsed to check it
    /// has a form.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Use an in-memory template.
    pub fn from_bytes(template: Vec<u8>) -> Result<Self, DocumentError> {
        let doc = Document::load_mem(&template)?;
        acroform(&doc)?;
        Ok(Self { template })
    }
}

impl DocumentFiller for PdfFormFiller {
    fn fill(&self, fields: &BTreeMap<String, String>) -> Result<Vec<u8>, DocumentError> {
        let mut doc = Document::load_mem(&self.template)?;
        let form = acroform(&doc)?;
        let form_fields = collect_fields(&doc, &form)?;

        for (id, name) in &form_fields {
            let dict = doc.get_object_mut(*id)?.as_dict_mut()?;
            if let Some(value) = fields.get(name) {
                dict.set("V", text_string(value));
                debug!(field = %name, "Filled form field");
            }
            let flags = dict.get(b"Ff").and_then(Object::as_i64).unwrap_or(0);
            dict.set("Ff", Object::Integer(flags | READ_ONLY));
        }

        form_dict_mut(&mut doc, &form)?.set("NeedAppearances", Object::Boolean(true));

        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

/// Where the form dictionary lives.
enum FormLocation {
    /// Its own object.
    Object(ObjectId),
    /// Inline in the catalog.
    Catalog(ObjectId),
}

fn acroform(doc: &Document) -> Result<FormLocation, DocumentError> {
    let root = doc.trailer.get(b"Root")?.as_reference()?;
    let catalog = doc.get_object(root)?.as_dict()?;
    match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Ok(FormLocation::Object(*id)),
        Ok(Object::Dictionary(_)) => Ok(FormLocation::Catalog(root)),
        _ => Err(DocumentError::NoForm),
    }
}

fn form_dict<'a>(doc: &'a Document, form: &FormLocation) -> Result<&'a Dictionary, DocumentError> {
    let dict = match form {
        FormLocation::Object(id) => doc.get_object(*id)?.as_dict()?,
        FormLocation::Catalog(root) => doc.get_object(*root)?.as_dict()?.get(b"AcroForm")?.as_dict()?,
    };
    Ok(dict)
}

fn form_dict_mut<'a>(
    doc: &'a mut Document,
    form: &FormLocation,
) -> Result<&'a mut Dictionary, DocumentError> {
    let dict = match form {
        FormLocation::Object(id) => doc.get_object_mut(*id)?.as_dict_mut()?,
        FormLocation::Catalog(root) => doc
            .get_object_mut(*root)?
            .as_dict_mut()?
            .get_mut(b"AcroForm")?
            .as_dict_mut()?,
    };
    Ok(dict)
}

/// Every named field in the form tree with its fully qualified name
/// (`parent.child`).
fn collect_fields(doc: &Document, form: &FormLocation) -> Result<Vec<(ObjectId, String)>, DocumentError> {
    let mut pending: Vec<(ObjectId, String)> = references(form_dict(doc, form)?, b"Fields")
        .into_iter()
        .map(|id| (id, String::new()))
        .collect();
    let mut fields = Vec::new();

    while let Some((id, prefix)) = pending.pop() {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            continue;
        };

        let name = match dict.get(b"T").and_then(Object::as_str) {
            Ok(partial) => {
                let partial = String::from_utf8_lossy(partial);
                let name = if prefix.is_empty() {
                    partial.to_string()
                } else {
                    format!("{}.{}", prefix, partial)
                };
                fields.push((id, name.clone()));
                name
            }
            // Widget annotations without a name belong to their parent.
            Err(_) => prefix,
        };

        for kid in references(dict, b"Kids") {
            pending.push((kid, name.clone()));
        }
    }

    Ok(fields)
}

fn references(dict: &Dictionary, key: &[u8]) -> Vec<ObjectId> {
    dict.get(key)
        .and_then(Object::as_array)
        .map(|items| items.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default()
}

/// Encode a PDF text string: plain for ASCII, UTF-16BE with a byte order
/// mark otherwise.
fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// A prescription as submitted to the backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Prescription {
    pub patient_name: Option<String>,
    pub drug1_name: Option<String>,
    pub drug1_timing: Option<String>,
    pub drug2_name: Option<String>,
    pub drug2_timing: Option<String>,
    pub notes: Option<String>,
}

impl Prescription {
    /// Map to template field names. Patient name and the first drug are
    /// required; optional fields are filled with empty text.
    pub fn form_fields(&self) -> Result<BTreeMap<String, String>, DocumentError> {
        let required = [
            ("patient_name", "patientName", &self.patient_name),
            ("drug1_name", "drug1Name", &self.drug1_name),
            ("drug1_timing", "drug1Timing", &self.drug1_timing),
        ];
        let optional = [
            ("drug2_name", &self.drug2_name),
            ("drug2_timing", &self.drug2_timing),
            ("notes", &self.notes),
        ];

        let mut fields = BTreeMap::new();
        for (field, json_name, value) in required {
            let value = value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(DocumentError::MissingField(json_name))?;
            fields.insert(field.to_string(), value.to_string());
        }
        for (field, value) in optional {
            let value = value.as_deref().map(str::trim).unwrap_or_default();
            fields.insert(field.to_string(), value.to_string());
        }

        Ok(fields)
    }
}
