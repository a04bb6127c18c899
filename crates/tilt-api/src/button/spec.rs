//!
//! # UIButton Spec
//!
//! Clickable button rendered by the UI, attached either to a resource or to the global nav.
//!
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::core::Spec;
use crate::validation::{ErrorList, FieldError, FieldPath};

use super::UIButtonStatus;

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UIButtonSpec {
    /// component the button is attached to
    pub location: UIComponentLocation,
    /// button text, or hover text depending on location
    pub text: String,
    /// Material icon name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_name: String,
    /// inline `<svg>` scaled for a 24x24 viewport, takes precedence over `icon_name`
    #[serde(default, rename = "iconSVG", skip_serializing_if = "String::is_empty")]
    pub icon_svg: String,
    /// rendered but not clickable
    #[serde(default, skip_serializing_if = "crate::is_false")]
    pub disabled: bool,
}

impl Spec for UIButtonSpec {
    const LABEL: &'static str = "UIButton";
    const PLURAL: &'static str = "uibuttons";
    type Status = UIButtonStatus;

    fn validate(&self) -> ErrorList {
        let mut errors = ErrorList::default();

        if self.text.is_empty() {
            errors.push(FieldError::required(
                FieldPath::new("spec.text"),
                "Button text cannot be empty",
            ));
        }

        errors.extend(self.location.validate(&FieldPath::new("spec.location")));

        // coarse check, catches file names or bare <path> elements
        if !self.icon_svg.is_empty() && !self.icon_svg.contains("<svg") {
            errors.push(FieldError::invalid(
                FieldPath::new("spec.iconSVG"),
                &self.icon_svg,
                "Invalid <svg> element",
            ));
        }

        errors
    }
}

impl UIButtonSpec {
    pub fn new<T: Into<String>>(location: UIComponentLocation, text: T) -> Self {
        Self {
            location,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_icon_name<T: Into<String>>(mut self, icon_name: T) -> Self {
        self.icon_name = icon_name.into();
        self
    }

    pub fn with_icon_svg<T: Into<String>>(mut self, icon_svg: T) -> Self {
        self.icon_svg = icon_svg.into();
        self
    }

    pub fn set_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// icon to render, svg wins over icon name
    pub fn icon(&self) -> Option<ButtonIcon<'_>> {
        if !self.icon_svg.is_empty() {
            Some(ButtonIcon::Svg(&self.icon_svg))
        } else if !self.icon_name.is_empty() {
            Some(ButtonIcon::Name(&self.icon_name))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonIcon<'a> {
    Name(&'a str),
    Svg(&'a str),
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct UIComponentLocation {
    /// parent component, ex: resource name for `Resource`
    #[serde(rename = "componentID", default)]
    pub component_id: String,
    #[serde(
        rename = "componentType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub component_type: Option<ComponentType>,
}

impl UIComponentLocation {
    pub fn resource<T: Into<String>>(name: T) -> Self {
        Self {
            component_id: name.into(),
            component_type: Some(ComponentType::Resource),
        }
    }

    pub fn global<T: Into<String>>(id: T) -> Self {
        Self {
            component_id: id.into(),
            component_type: Some(ComponentType::Global),
        }
    }

    fn validate(&self, path: &FieldPath) -> ErrorList {
        let mut errors = ErrorList::default();
        if self.component_id.is_empty() {
            errors.push(FieldError::required(
                path.child("componentID"),
                "Parent component ID is required",
            ));
        }
        if self.component_type.is_none() {
            errors.push(FieldError::required(
                path.child("componentType"),
                "Parent component type is required",
            ));
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    Resource,
    Global,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "Resource"),
            Self::Global => write!(f, "Global"),
        }
    }
}
