//! Service descriptor parsing.
//!
//! A descriptor is the line-oriented declaration of a service contract: which
//! functions can be dispatched and which properties are served. The bridge
//! only ever compares the declared names for equality — parameter signatures
//! are carried through untouched for introspection.
//!
//! # Example
//!
//! ```
//! use pollbridge::descriptor::ServiceDescriptor;
//!
//! let descriptor = ServiceDescriptor::parse(
//!     "function SayHello(Greeting string) (Answer string)\n\
//!      property Mood: State string\n\
//!      tag example_tag",
//! ).unwrap();
//!
//! assert!(descriptor.has_function("SayHello"));
//! assert!(descriptor.has_property("Mood"));
//! ```

use std::fmt;

use thiserror::Error;

/// Error produced while parsing a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Descriptor declares no functions and no properties.
    #[error("descriptor declares neither functions nor properties")]
    Empty,

    /// A line starts with something other than `function`, `func`,
    /// `property` or `tag`.
    #[error("line {0}: unknown directive `{1}`")]
    UnknownDirective(usize, String),

    /// A directive is missing its name.
    #[error("line {0}: missing name")]
    MissingName(usize),

    /// A declared name is not a plain identifier.
    #[error("line {0}: `{1}` is not a valid identifier")]
    InvalidName(usize, String),

    /// The same function name is declared twice.
    #[error("function `{0}` declared twice")]
    DuplicateFunction(String),

    /// The same property name is declared twice.
    #[error("property `{0}` declared twice")]
    DuplicateProperty(String),
}

/// A declared function: name plus its verbatim signature text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Function name, unique per descriptor.
    pub name: String,
    /// Signature text after the name, e.g. `(Greeting string) (Answer string)`.
    pub signature: String,
}

/// A declared property: name plus its verbatim value-schema text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    /// Property name, unique per descriptor.
    pub name: String,
    /// Schema text after the colon, e.g. `State string`. May be empty.
    pub schema: String,
}

/// Parsed service contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    functions: Vec<FunctionSpec>,
    properties: Vec<PropertySpec>,
    tags: Vec<String>,
}

impl ServiceDescriptor {
    /// Parse descriptor text.
    ///
    /// Grammar, one directive per line (blank lines skipped):
    ///
    /// ```text
    /// function <Name><signature...>
    /// func <Name><signature...>
    /// property <Name>[: <schema...>]
    /// tag <name>
    /// ```
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut functions: Vec<FunctionSpec> = Vec::new();
        let mut properties: Vec<PropertySpec> = Vec::new();
        let mut tags: Vec<String> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let lineno = index + 1;

            let (directive, rest) = match line.split_once(char::is_whitespace) {
                Some((d, r)) => (d, r.trim()),
                None => (line, ""),
            };

            match directive {
                "function" | "func" => {
                    let (name, signature) = split_function(rest);
                    check_name(lineno, name)?;
                    if functions.iter().any(|f| f.name == name) {
                        return Err(DescriptorError::DuplicateFunction(name.to_string()));
                    }
                    functions.push(FunctionSpec {
                        name: name.to_string(),
                        signature: signature.trim().to_string(),
                    });
                }
                "property" => {
                    let (name, schema) = match rest.split_once(':') {
                        Some((n, s)) => (n.trim(), s.trim()),
                        None => (rest, ""),
                    };
                    check_name(lineno, name)?;
                    if properties.iter().any(|p| p.name == name) {
                        return Err(DescriptorError::DuplicateProperty(name.to_string()));
                    }
                    properties.push(PropertySpec {
                        name: name.to_string(),
                        schema: schema.to_string(),
                    });
                }
                "tag" => {
                    check_name(lineno, rest)?;
                    tags.push(rest.to_string());
                }
                other => {
                    return Err(DescriptorError::UnknownDirective(
                        lineno,
                        other.to_string(),
                    ));
                }
            }
        }

        if functions.is_empty() && properties.is_empty() {
            return Err(DescriptorError::Empty);
        }

        Ok(Self {
            functions,
            properties,
            tags,
        })
    }

    /// Validity check: `None` for a parsable descriptor, otherwise the parse
    /// error message.
    pub fn check(text: &str) -> Option<String> {
        Self::parse(text).err().map(|e| e.to_string())
    }

    /// True when `function` is part of the contract.
    pub fn has_function(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f.name == function)
    }

    /// True when `property` is part of the contract.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p.name == property)
    }

    /// Declared functions, in declaration order.
    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Declared properties, in declaration order.
    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    /// Declared property names, in declaration order.
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    /// Declared tags, in declaration order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Canonical normalized rendering. Two descriptors with the same
    /// declarations render identically; sessions expose this as their
    /// interface string.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut line = |f: &mut fmt::Formatter<'_>, text: String| {
            if first {
                first = false;
                write!(f, "{text}")
            } else {
                write!(f, "\n{text}")
            }
        };
        for func in &self.functions {
            if func.signature.is_empty() {
                line(f, format!("function {}", func.name))?;
            } else {
                line(f, format!("function {}{}", func.name, func.signature))?;
            }
        }
        for prop in &self.properties {
            if prop.schema.is_empty() {
                line(f, format!("property {}", prop.name))?;
            } else {
                line(f, format!("property {}: {}", prop.name, prop.schema))?;
            }
        }
        for tag in &self.tags {
            line(f, format!("tag {tag}"))?;
        }
        Ok(())
    }
}

/// Split `SayHello(Greeting string) (Answer string)` into name and signature.
fn split_function(rest: &str) -> (&str, &str) {
    match rest.find('(') {
        Some(pos) => (rest[..pos].trim(), &rest[pos..]),
        None => (rest, ""),
    }
}

fn check_name(lineno: usize, name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() {
        return Err(DescriptorError::MissingName(lineno));
    }
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !head_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DescriptorError::InvalidName(lineno, name.to_string()));
    }
    Ok(())
}
