//! # Property Registry
//!
//! Declared property exposition for a microservice.
//!
//! Each owner constructs an explicit registry of named properties backed
//! by accessor (and, for writable properties, mutator) closures.
//! Classification and visibility are declared data, not inferred from
//! naming conventions. The registry of names is fixed once attachment
//! completes; only values change afterwards.
//!
//! On the wire, property names use camelCase, optionally prefixed with
//! the owner's tag (`gnss_fix_age` -> `gnssFixAge`) when tagging is
//! enabled, or overridden per property with an explicit ISC name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IscError;

/// Wire label for read-only properties.
pub const READ_ONLY: &str = "info";

/// Wire label for read/write properties.
pub const READ_WRITE: &str = "config";

/// Property classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Read-only.
    Info,
    /// Read/write.
    Config,
}

impl PropertyKind {
    /// The wire label for this classification.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => READ_ONLY,
            Self::Config => READ_WRITE,
        }
    }
}

/// Property visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Listed locally and exposed over ISC.
    #[default]
    Exposed,
    /// Listed locally, never exposed over ISC.
    LocalOnly,
}

/// Declared metadata for one property.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Unique (per owner) native name, snake_case.
    pub name: String,
    /// Read-only or read/write.
    pub kind: PropertyKind,
    /// Local-only or ISC-exposed.
    pub visibility: Visibility,
    /// Optional explicit wire name, bypassing tag resolution.
    pub isc_name: Option<String>,
}

/// Accessor closure producing the current value.
pub type Accessor = Box<dyn Fn() -> Value + Send + Sync>;

/// Mutator closure applying a new value.
pub type Mutator = Box<dyn Fn(&Value) -> Result<(), IscError> + Send + Sync>;

/// How a property is backed.
enum Backing {
    ReadOnly(Accessor),
    ReadWrite { get: Accessor, set: Mutator },
}

/// A property definition ready for registration.
pub struct PropertyDef {
    descriptor: PropertyDescriptor,
    backing: Backing,
}

impl PropertyDef {
    /// A read-only (`info`) property.
    pub fn info(name: impl Into<String>, accessor: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            descriptor: PropertyDescriptor {
                name: name.into(),
                kind: PropertyKind::Info,
                visibility: Visibility::default(),
                isc_name: None,
            },
            backing: Backing::ReadOnly(Box::new(accessor)),
        }
    }

    /// A read/write (`config`) property.
    pub fn config(
        name: impl Into<String>,
        accessor: impl Fn() -> Value + Send + Sync + 'static,
        mutator: impl Fn(&Value) -> Result<(), IscError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            descriptor: PropertyDescriptor {
                name: name.into(),
                kind: PropertyKind::Config,
                visibility: Visibility::default(),
                isc_name: None,
            },
            backing: Backing::ReadWrite {
                get: Box::new(accessor),
                set: Box::new(mutator),
            },
        }
    }

    /// Exclude this property from ISC exposition.
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.descriptor.visibility = Visibility::LocalOnly;
        self
    }

    /// Override the resolved wire name.
    #[must_use]
    pub fn isc_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.isc_name = Some(name.into());
        self
    }

    /// The declared metadata.
    #[must_use]
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }
}

struct Registered {
    descriptor: PropertyDescriptor,
    backing: Backing,
    wire_name: String,
    hidden: bool,
    isc_hidden: bool,
}

/// Ordered registry of an owner's properties.
pub struct PropertyRegistry {
    tag: String,
    use_tags: bool,
    entries: Vec<Registered>,
}

impl PropertyRegistry {
    /// Create an empty registry for an owner.
    ///
    /// With `use_tags` set, resolved wire names are prefixed with the
    /// owner's tag.
    #[must_use]
    pub fn new(tag: impl Into<String>, use_tags: bool) -> Self {
        Self {
            tag: tag.into(),
            use_tags,
            entries: Vec::new(),
        }
    }

    /// Register a property.
    ///
    /// Registration order is preserved and drives listing order.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::DuplicateName`] if the native name, or the
    /// resolved wire name, collides with an existing entry. The registry
    /// is unchanged on failure.
    pub fn register(&mut self, def: PropertyDef) -> Result<(), IscError> {
        self.register_prefixed(def, None)
    }

    /// Register a property contributed by a feature, prefixing its
    /// native name with the feature tag.
    ///
    /// # Errors
    ///
    /// Same conditions as [`PropertyRegistry::register`].
    pub fn register_prefixed(
        &mut self,
        def: PropertyDef,
        prefix: Option<&str>,
    ) -> Result<(), IscError> {
        let PropertyDef {
            mut descriptor,
            backing,
        } = def;
        if let Some(prefix) = prefix {
            descriptor.name = format!("{prefix}_{}", descriptor.name);
        }
        let wire_name = match &descriptor.isc_name {
            Some(explicit) => explicit.clone(),
            None => {
                let tagged = if self.use_tags {
                    format!("{}_{}", self.tag, descriptor.name)
                } else {
                    descriptor.name.clone()
                };
                snake_to_camel(&tagged)
            }
        };
        if self.entries.iter().any(|e| e.descriptor.name == descriptor.name) {
            return Err(IscError::DuplicateName {
                name: descriptor.name,
            });
        }
        if descriptor.visibility == Visibility::Exposed
            && self
                .entries
                .iter()
                .any(|e| e.descriptor.visibility == Visibility::Exposed && e.wire_name == wire_name)
        {
            return Err(IscError::DuplicateName { name: wire_name });
        }
        self.entries.push(Registered {
            descriptor,
            backing,
            wire_name,
            hidden: false,
            isc_hidden: false,
        });
        Ok(())
    }

    /// Non-hidden native property names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.hidden)
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    /// Native names grouped by classification.
    #[must_use]
    pub fn names_by_kind(&self, kind: PropertyKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.hidden && e.descriptor.kind == kind)
            .map(|e| e.descriptor.name.clone())
            .collect()
    }

    /// Ordered ISC-exposed wire names.
    #[must_use]
    pub fn exposed_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| self.is_exposed(e))
            .map(|e| e.wire_name.clone())
            .collect()
    }

    /// Exposed wire names grouped by classification.
    #[must_use]
    pub fn exposed_names_by_kind(&self, kind: PropertyKind) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| self.is_exposed(e) && e.descriptor.kind == kind)
            .map(|e| e.wire_name.clone())
            .collect()
    }

    fn is_exposed(&self, entry: &Registered) -> bool {
        entry.descriptor.visibility == Visibility::Exposed && !entry.hidden && !entry.isc_hidden
    }

    fn find_wire(&self, wire_name: &str) -> Option<&Registered> {
        self.entries
            .iter()
            .find(|e| self.is_exposed(e) && e.wire_name == wire_name)
    }

    fn find_native(&self, name: &str) -> Option<&Registered> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    /// The resolved wire name for a native name, if registered.
    #[must_use]
    pub fn wire_name(&self, name: &str) -> Option<String> {
        self.find_native(name).map(|e| e.wire_name.clone())
    }

    /// Current value of a property by native name.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<Value, IscError> {
        let entry = self.find_native(name).ok_or_else(|| IscError::UnknownProperty {
            name: name.to_string(),
        })?;
        Ok(match &entry.backing {
            Backing::ReadOnly(get) | Backing::ReadWrite { get, .. } => get(),
        })
    }

    /// Current value of a property by exposed wire name.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for names that are not
    /// registered or not exposed.
    pub fn get_isc(&self, wire_name: &str) -> Result<Value, IscError> {
        let entry = self.find_wire(wire_name).ok_or_else(|| IscError::UnknownProperty {
            name: wire_name.to_string(),
        })?;
        Ok(match &entry.backing {
            Backing::ReadOnly(get) | Backing::ReadWrite { get, .. } => get(),
        })
    }

    /// Apply a new value to a `config` property by exposed wire name and
    /// return the value actually in effect afterwards.
    ///
    /// # Errors
    ///
    /// - [`IscError::UnknownProperty`] for names that are not registered
    ///   or not exposed
    /// - [`IscError::ReadOnlyProperty`] for `info` properties
    /// - [`IscError::InvalidValue`] if the mutator rejects the value
    pub fn set_isc(&self, wire_name: &str, value: &Value) -> Result<Value, IscError> {
        let entry = self.find_wire(wire_name).ok_or_else(|| IscError::UnknownProperty {
            name: wire_name.to_string(),
        })?;
        match &entry.backing {
            Backing::ReadOnly(_) => Err(IscError::ReadOnlyProperty {
                name: wire_name.to_string(),
            }),
            Backing::ReadWrite { get, set } => {
                set(value)?;
                Ok(get())
            }
        }
    }

    /// Hide a property from local listing.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn hide(&mut self, name: &str) -> Result<(), IscError> {
        self.set_hidden(name, true)
    }

    /// Unhide a previously hidden property.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unregistered names.
    pub fn unhide(&mut self, name: &str) -> Result<(), IscError> {
        self.set_hidden(name, false)
    }

    fn set_hidden(&mut self, name: &str, hidden: bool) -> Result<(), IscError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.descriptor.name == name)
            .ok_or_else(|| IscError::UnknownProperty {
                name: name.to_string(),
            })?;
        entry.hidden = hidden;
        Ok(())
    }

    /// Hide a property from ISC exposition while keeping it local.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unknown wire names.
    pub fn isc_hide(&mut self, wire_name: &str) -> Result<(), IscError> {
        self.set_isc_hidden(wire_name, true)
    }

    /// Restore ISC exposition of a property.
    ///
    /// # Errors
    ///
    /// Returns [`IscError::UnknownProperty`] for unknown wire names.
    pub fn isc_unhide(&mut self, wire_name: &str) -> Result<(), IscError> {
        self.set_isc_hidden(wire_name, false)
    }

    fn set_isc_hidden(&mut self, wire_name: &str, isc_hidden: bool) -> Result<(), IscError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.wire_name == wire_name)
            .ok_or_else(|| IscError::UnknownProperty {
                name: wire_name.to_string(),
            })?;
        entry.isc_hidden = isc_hidden;
        Ok(())
    }

    /// True if a native name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.find_native(name).is_some()
    }

    /// Number of registered properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no properties are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Convert a snake_case name to camelCase.
#[must_use]
pub fn snake_to_camel(snake: &str) -> String {
    let mut words = snake.split('_');
    let mut out = String::with_capacity(snake.len());
    if let Some(first) = words.next() {
        out.push_str(first);
    }
    for word in words {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars);
        }
    }
    out
}

/// Convert a camelCase name to snake_case.
#[must_use]
pub fn camel_to_snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for c in camel.chars() {
        if c.is_uppercase() {
            out.push('_');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn registry() -> PropertyRegistry {
        PropertyRegistry::new("gnss", false)
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(snake_to_camel("fix_age"), "fixAge");
        assert_eq!(snake_to_camel("gnss_fix_age"), "gnssFixAge");
        assert_eq!(snake_to_camel("single"), "single");
        assert_eq!(camel_to_snake("gnssFixAge"), "gnss_fix_age");
        assert_eq!(camel_to_snake("single"), "single");
    }

    #[test]
    fn test_register_and_get() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(12))).unwrap();
        assert_eq!(reg.names(), vec!["fix_age"]);
        assert_eq!(reg.exposed_names(), vec!["fixAge"]);
        assert_eq!(reg.get("fix_age").unwrap(), json!(12));
        assert_eq!(reg.get_isc("fixAge").unwrap(), json!(12));
    }

    #[test]
    fn test_duplicate_name_leaves_registry_unchanged() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        let err = reg
            .register(PropertyDef::info("fix_age", || json!(2)))
            .unwrap_err();
        assert!(matches!(err, IscError::DuplicateName { .. }));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("fix_age").unwrap(), json!(1));
    }

    #[test]
    fn test_wire_name_collision_rejected() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        // Different native name resolving to the same wire name.
        let err = reg
            .register(PropertyDef::info("mode", || json!(2)).isc_name("fixAge"))
            .unwrap_err();
        assert!(matches!(err, IscError::DuplicateName { .. }));
    }

    #[test]
    fn test_tagged_wire_names() {
        let mut reg = PropertyRegistry::new("gnss", true);
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        assert_eq!(reg.exposed_names(), vec!["gnssFixAge"]);
        assert_eq!(reg.get_isc("gnssFixAge").unwrap(), json!(1));
    }

    #[test]
    fn test_config_set_round_trip() {
        let mut reg = registry();
        let backing = Arc::new(AtomicI64::new(2));
        let get = Arc::clone(&backing);
        let set = Arc::clone(&backing);
        reg.register(PropertyDef::config(
            "report_interval",
            move || json!(get.load(Ordering::SeqCst)),
            move |v| {
                let value = v.as_i64().ok_or_else(|| IscError::InvalidValue {
                    name: "report_interval".to_string(),
                    reason: "must be an integer".to_string(),
                })?;
                set.store(value, Ordering::SeqCst);
                Ok(())
            },
        ))
        .unwrap();

        let applied = reg.set_isc("reportInterval", &json!(30)).unwrap();
        assert_eq!(applied, json!(30));
        assert_eq!(reg.get_isc("reportInterval").unwrap(), json!(30));

        let err = reg.set_isc("reportInterval", &json!("soon")).unwrap_err();
        assert!(matches!(err, IscError::InvalidValue { .. }));
    }

    #[test]
    fn test_set_info_rejected() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        let err = reg.set_isc("fixAge", &json!(2)).unwrap_err();
        assert!(matches!(err, IscError::ReadOnlyProperty { .. }));
    }

    #[test]
    fn test_unknown_property() {
        let reg = registry();
        assert!(matches!(
            reg.get_isc("missing"),
            Err(IscError::UnknownProperty { .. })
        ));
        assert!(matches!(
            reg.set_isc("missing", &json!(1)),
            Err(IscError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_local_only_never_exposed() {
        let mut reg = registry();
        reg.register(PropertyDef::info("secret", || json!("s")).local_only())
            .unwrap();
        assert_eq!(reg.names(), vec!["secret"]);
        assert!(reg.exposed_names().is_empty());
        assert!(matches!(
            reg.get_isc("secret"),
            Err(IscError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_hide_and_isc_hide() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        reg.register(PropertyDef::config("mode", || json!("auto"), |_| Ok(())))
            .unwrap();

        reg.isc_hide("fixAge").unwrap();
        assert_eq!(reg.exposed_names(), vec!["mode"]);
        assert_eq!(reg.names(), vec!["fix_age", "mode"]);
        reg.isc_unhide("fixAge").unwrap();
        assert_eq!(reg.exposed_names(), vec!["fixAge", "mode"]);

        reg.hide("fix_age").unwrap();
        assert_eq!(reg.names(), vec!["mode"]);
        assert_eq!(reg.exposed_names(), vec!["mode"]);
        reg.unhide("fix_age").unwrap();
        assert_eq!(reg.names(), vec!["fix_age", "mode"]);
    }

    #[test]
    fn test_names_by_kind() {
        let mut reg = registry();
        reg.register(PropertyDef::info("fix_age", || json!(1))).unwrap();
        reg.register(PropertyDef::config("mode", || json!("auto"), |_| Ok(())))
            .unwrap();
        assert_eq!(reg.names_by_kind(PropertyKind::Info), vec!["fix_age"]);
        assert_eq!(reg.names_by_kind(PropertyKind::Config), vec!["mode"]);
        assert_eq!(reg.exposed_names_by_kind(PropertyKind::Config), vec!["mode"]);
    }
}
