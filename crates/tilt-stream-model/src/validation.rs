//!
//! # Field validation
//!
//! Structured, field path scoped validation errors returned by write operations.
//!
use std::fmt;
use std::fmt::Display;
use std::ops::Deref;

/// dotted path to a field, ex: `spec.location.componentID`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new<P: Into<String>>(path: P) -> Self {
        Self(path.into())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    Required,
    Invalid,
    Forbidden,
}

impl Display for FieldErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "Required value"),
            Self::Invalid => write!(f, "Invalid value"),
            Self::Forbidden => write!(f, "Forbidden"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub error_type: FieldErrorType,
    pub field: FieldPath,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn required<D: Into<String>>(field: FieldPath, detail: D) -> Self {
        Self {
            error_type: FieldErrorType::Required,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn invalid<V: Display, D: Into<String>>(field: FieldPath, value: V, detail: D) -> Self {
        Self {
            error_type: FieldErrorType::Invalid,
            field,
            bad_value: Some(value.to_string()),
            detail: detail.into(),
        }
    }

    pub fn forbidden<D: Into<String>>(field: FieldPath, detail: D) -> Self {
        Self {
            error_type: FieldErrorType::Forbidden,
            field,
            bad_value: None,
            detail: detail.into(),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bad_value {
            Some(value) => write!(
                f,
                "{}: {}: {:?}: {}",
                self.field, self.error_type, value, self.detail
            ),
            None => write!(f, "{}: {}: {}", self.field, self.error_type, self.detail),
        }
    }
}

/// list of field errors, empty means valid
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorList(Vec<FieldError>);

impl ErrorList {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// first error at field path
    pub fn find(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|err| err.field.as_str() == field)
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl Deref for ErrorList {
    type Target = [FieldError];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no errors"),
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "[")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{err}")?;
                }
                write!(f, "]")
            }
        }
    }
}
