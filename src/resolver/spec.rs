//! The declarative specification of one release vector.

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use crate::constants::DEFAULT_TAR_MEMBER;
use crate::core::VectorError;
use crate::loader::OciOptions;
use crate::verify::CosignOptions;

/// What to load and how to map it, as given in the task arguments.
///
/// Unknown fields are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorSpec {
    /// URL or `oci://` reference of the document (top level only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Dotted path in the parent document yielding the URL (nested only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,

    /// Dotted path into the variable layers yielding the mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_mapping_path: Option<String>,

    /// Mapping of variable name to dotted document path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,

    /// Replacement rules; unset means the inherited or default rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<Vec<ReplaceRule>>,

    /// Nested vectors referenced from this document
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<VectorSpec>,

    /// Whether nested vectors are followed
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub recursive: bool,

    /// Whether roles listed in the document are installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_roles: Option<bool>,

    /// Dotted path of the role dictionary, `ansible-roles` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_roles_path: Option<String>,

    /// Install roles under a different name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_aliases: Vec<RoleAlias>,

    /// Roles whose defaults join the variable layers, in load order
    #[serde(
        default,
        alias = "from_role_defaults",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub include_role_defaults: Vec<String>,

    /// Variable holding a complete specification; keys given here win
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_var: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_registry_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_registry_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_registry_scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_cosign_verify_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_cosign_verify_certificate_identity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_cosign_verify_certificate_oidc_issuer: Option<String>,

    /// Archive member holding the document of an OCI release vector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tar_member_file_name: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn is_true(value: &bool) -> bool {
    *value
}

// A single role name or a list of them
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(role)) => vec![role],
        Some(OneOrMany::Many(roles)) => roles,
    })
}

impl VectorSpec {
    /// Deserialize a specification from task arguments.
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_yaml::from_value(value.clone()).map_err(|e| {
            let url = value.get("url").and_then(Value::as_str).unwrap_or("<vector>");
            VectorError::InvalidSpec {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Layer this specification over `meta`, the value of its `meta_var`.
    ///
    /// Keys set here override the ones from `meta`; the result carries no
    /// `meta_var` of its own.
    pub fn over_meta(&self, meta: &Mapping) -> Result<Self> {
        let own = serde_yaml::to_value(self).map_err(|e| VectorError::ConfigError {
            message: format!("cannot merge vector specification: {e}"),
        })?;

        let mut merged = meta.clone();
        if let Value::Mapping(own) = own {
            for (key, value) in own {
                merged.insert(key, value);
            }
        }
        merged.remove("meta_var");
        Self::from_value(&Value::Mapping(merged))
    }

    /// Registry settings declared by this specification alone.
    pub fn oci_options(&self) -> OciOptions {
        OciOptions {
            username: self.oci_registry_username.clone(),
            password: self.oci_registry_password.clone(),
            scheme: self.oci_registry_scheme.clone(),
            cosign: CosignOptions {
                key: self.oci_cosign_verify_key.clone(),
                certificate_identity: self.oci_cosign_verify_certificate_identity.clone(),
                certificate_oidc_issuer: self.oci_cosign_verify_certificate_oidc_issuer.clone(),
            },
        }
    }

    /// The archive member, `release.yaml` when unset.
    pub fn tar_member(&self) -> &str {
        self.tar_member_file_name.as_deref().unwrap_or(DEFAULT_TAR_MEMBER)
    }
}

/// Replace `old` with `new` in every string stored under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceRule {
    pub key: String,
    pub old: String,
    pub new: String,
}

impl ReplaceRule {
    /// Parse a list of rules, e.g. from a task variable.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_yaml::from_value(value.clone()).map_err(|e| {
            VectorError::ConfigError {
                message: format!(
                    "replace must contain a list of dicts with the keys 'key', 'old' and 'new': {e}"
                ),
            }
            .into()
        })
    }
}

/// Install a role under `alias`.
///
/// Matches a role either by its declared repository or by its key in the
/// role dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleAlias {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub alias: String,
}

impl RoleAlias {
    /// Whether this alias applies to the role `key` declared with
    /// `repository`.
    pub fn matches(&self, key: &str, repository: Option<&str>) -> bool {
        let by_repository =
            self.repository.is_some() && self.repository.as_deref() == repository;
        by_repository || self.name.as_deref() == Some(key)
    }
}

/// The alias applying to role `key`; when several match, the last one wins.
pub fn find_alias<'a>(aliases: &'a [RoleAlias], key: &str, repository: Option<&str>) -> Option<&'a RoleAlias> {
    aliases.iter().rev().find(|alias| alias.matches(key, repository))
}

/// Validate a mapping value and return its `(variable, path)` entries in
/// order.
pub fn mapping_entries(mapping: &Mapping, url: &str) -> Result<Vec<(String, String)>> {
    mapping
        .iter()
        .map(|(name, path)| match (name.as_str(), path.as_str()) {
            (Some(name), Some(path)) => Ok((name.to_string(), path.to_string())),
            _ => Err(VectorError::InvalidSpec {
                url: url.to_string(),
                reason: format!("mapping entries must map strings to dotted paths, got {name:?}: {path:?}"),
            }
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> Result<VectorSpec> {
        VectorSpec::from_value(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_parse_full_spec() {
        let spec = spec(
            r#"
url: oci://ghcr.io/metal-stack/releases:v0.1.0
variable_mapping_path: metal_stack_release.mapping
replace:
  - key: repository
    old: ghcr.io
    new: mirror.example
nested:
  - url_path: vectors.partition.url
    mapping:
      metal_core_tag: docker-images.metal-core.tag
role_aliases:
  - repository: https://github.com/metal-stack/ansible-common.git
    alias: common
oci_registry_scheme: http
oci_cosign_verify_key: /etc/cosign.pub
"#,
        )
        .unwrap();

        assert!(spec.recursive);
        assert_eq!(spec.replace.as_ref().map(Vec::len), Some(1));
        assert_eq!(spec.nested[0].url_path.as_deref(), Some("vectors.partition.url"));
        assert_eq!(spec.oci_options().scheme(), "http");
        assert_eq!(spec.oci_options().cosign.key.as_deref(), Some("/etc/cosign.pub"));
        assert_eq!(spec.tar_member(), "release.yaml");
    }

    #[test]
    fn test_role_defaults_accept_one_or_many() {
        assert_eq!(spec("url: u\ninclude_role_defaults: a\n").unwrap().include_role_defaults, vec!["a"]);
        assert_eq!(
            spec("url: u\nfrom_role_defaults: [a, b]\n").unwrap().include_role_defaults,
            vec!["a", "b"]
        );
        assert!(spec("url: u\n").unwrap().include_role_defaults.is_empty());
    }

    #[test]
    fn test_over_meta_prefers_own_keys() {
        let inline = spec("meta_var: release_meta\nmapping:\n  a: own.a\n").unwrap();
        let meta: Mapping = serde_yaml::from_str(
            "url: https://example.com/r.yaml\nmapping:\n  a: meta.a\nrecursive: false\n",
        )
        .unwrap();

        let merged = inline.over_meta(&meta).unwrap();
        assert_eq!(merged.url.as_deref(), Some("https://example.com/r.yaml"));
        assert_eq!(merged.mapping.unwrap().get("a").and_then(Value::as_str), Some("own.a"));
        assert!(!merged.recursive);
        assert!(merged.meta_var.is_none());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = spec("url: https://example.com/r.yaml\nvariable_maping_path: x\n").unwrap_err();
        match err.downcast_ref::<VectorError>() {
            Some(VectorError::InvalidSpec {
                url,
                reason,
            }) => {
                assert_eq!(url, "https://example.com/r.yaml");
                assert!(reason.contains("variable_maping_path"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_replace_rule_requires_all_keys() {
        assert!(spec("url: u\nreplace:\n  - key: a\n    old: b\n").is_err());
        let value: Value = serde_yaml::from_str("- key: a\n  old: b\n").unwrap();
        assert!(ReplaceRule::list_from_value(&value).is_err());
        assert!(ReplaceRule::list_from_value(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_role_alias_matching() {
        let by_repo = RoleAlias {
            repository: Some("https://github.com/x/ansible-common.git".to_string()),
            name: None,
            alias: "common".to_string(),
        };
        assert!(by_repo.matches("ansible-common", Some("https://github.com/x/ansible-common.git")));
        assert!(!by_repo.matches("ansible-common", None));

        let by_name = RoleAlias {
            repository: None,
            name: Some("ansible-common".to_string()),
            alias: "common".to_string(),
        };
        assert!(by_name.matches("ansible-common", None));
        assert!(!by_name.matches("other", None));
    }

    #[test]
    fn test_later_alias_wins() {
        let aliases: Vec<RoleAlias> = serde_yaml::from_str(
            "- repository: https://github.com/x/ansible-common.git\n  alias: by-repo\n- name: ansible-common\n  alias: by-name\n",
        )
        .unwrap();
        let found = find_alias(&aliases, "ansible-common", Some("https://github.com/x/ansible-common.git"));
        assert_eq!(found.map(|a| a.alias.as_str()), Some("by-name"));
        assert_eq!(find_alias(&aliases, "other", None), None);
    }

    #[test]
    fn test_mapping_entries_require_strings() {
        let mapping: Mapping = serde_yaml::from_str("a: x.y\nb: 1\n").unwrap();
        assert!(mapping_entries(&mapping, "u").is_err());

        let mapping: Mapping = serde_yaml::from_str("a: x.y\nb: z\n").unwrap();
        assert_eq!(
            mapping_entries(&mapping, "u").unwrap(),
            vec![("a".to_string(), "x.y".to_string()), ("b".to_string(), "z".to_string())]
        );
    }
}
