//! Declared method descriptors.

/// Prefix marking a method as private to the driver.
pub const PRIVATE_PREFIX: char = '_';

/// Declared shape of one driver method.
///
/// The signature is written by the driver author, for example
/// `read(&mut self, channel)`; any receiver parameter is dropped when the
/// descriptor is rendered for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    signature: String,
    doc: Option<String>,
}

impl MethodDescriptor {
    /// Builds a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            doc: None,
        }
    }

    /// Attaches a short description.
    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Method name as clients call it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Optional description.
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Whether the method is hidden from clients.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.name.starts_with(PRIVATE_PREFIX)
    }

    /// Renders the one-line help entry, or `None` when no signature was
    /// declared.
    #[must_use]
    pub fn help_line(&self) -> Option<String> {
        let first = self.signature.lines().next()?.trim();
        if first.is_empty() {
            return None;
        }
        let signature = strip_receiver(first);
        let summary = self
            .doc
            .as_deref()
            .and_then(|doc| doc.lines().next())
            .map(str::trim)
            .filter(|line| !line.is_empty());
        Some(match summary {
            Some(text) => format!("{signature} - {text}"),
            None => signature,
        })
    }
}

/// Drops a leading receiver (`self`, `&self`, `&mut self`, `mut self`) from
/// the parameter list.
fn strip_receiver(signature: &str) -> String {
    let Some((head, tail)) = signature.split_once('(') else {
        return signature.to_owned();
    };
    let params = tail.trim_start();
    for receiver in ["&mut self", "&self", "mut self", "self"] {
        if let Some(rest) = params.strip_prefix(receiver) {
            let rest = rest.trim_start();
            if let Some(after_comma) = rest.strip_prefix(',') {
                return format!("{head}({}", after_comma.trim_start());
            }
            if rest.starts_with(')') {
                return format!("{head}({rest}");
            }
        }
    }
    signature.to_owned()
}
