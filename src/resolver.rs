//! Finds the container images declared in a chart's values tree.
//!
//! Two layouts are recognised. When the root carries an `image` key the whole
//! chart declares one container, named after the chart. Otherwise every
//! top-level mapping with an `image` key of its own declares one container:
//!
//! ```yaml
//! controller:
//!   image:
//!     repository: quay.io/kubernetes-ingress-controller/nginx-ingress-controller
//!     tag: "0.12.0"
//! zeppelin:
//!   name: notebook
//!   image: dylanmei/zeppelin:0.7.2
//! ```
//!
//! Any malformed declaration fails the whole resolution.

use crate::image_reference::{ImageReference, ParseError};
use crate::state::ContainerEntry;
use crate::values::{Mapping, ValueNode};
use tracing::debug;

const IMAGE_KEY: &str = "image";
const NAME_KEY: &str = "name";
const REGISTRY_KEY: &str = "registry";
const REPOSITORY_KEY: &str = "repository";
const TAG_KEY: &str = "tag";
const FALLBACK_TAG_KEYS: [&str; 2] = [TAG_KEY, "imageTag"];

pub fn resolve_containers(
    values: &Mapping,
    fallback_name: &str,
) -> Result<Vec<ContainerEntry>, ParseError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(declared) = values.get(IMAGE_KEY) {
        let image = interpret(declared, values)?;
        debug!("Resolved top-level image {} for {}", image, fallback_name);
        return Ok(vec![ContainerEntry {
            name: fallback_name.to_string(),
            image,
        }]);
    }

    values
        .iter()
        .filter_map(|(key, value)| {
            let nested = value.as_mapping()?;
            let declared = nested.get(IMAGE_KEY)?;
            Some(resolve_nested(key, nested, declared))
        })
        .collect()
}

fn resolve_nested(
    key: &str,
    nested: &Mapping,
    declared: &ValueNode,
) -> Result<ContainerEntry, ParseError> {
    let name = nested
        .get(NAME_KEY)
        .and_then(ValueNode::as_text)
        .unwrap_or(key)
        .to_string();
    let image = interpret(declared, nested)?;
    debug!("Resolved nested image {} for container {}", image, name);
    Ok(ContainerEntry { name, image })
}

/// Interprets one `image` value. `siblings` is the mapping that holds it and
/// supplies the fallback tag of a plain string declaration.
pub fn interpret(declared: &ValueNode, siblings: &Mapping) -> Result<ImageReference, ParseError> {
    match declared {
        ValueNode::Scalar(text) => {
            let mut fallback_tag = None;
            for key in FALLBACK_TAG_KEYS {
                if let Some(tag) = component(siblings, key)? {
                    fallback_tag = Some(tag);
                    break;
                }
            }
            ImageReference::parse_with_tag(text, fallback_tag)
        }
        ValueNode::Mapping(fields) if is_image_mapping(fields) => interpret_mapping(fields),
        other => Err(ParseError::MalformedReference(format!(
            "unsupported image declaration of type {}",
            other.kind()
        ))),
    }
}

fn is_image_mapping(fields: &Mapping) -> bool {
    [REGISTRY_KEY, REPOSITORY_KEY, TAG_KEY]
        .iter()
        .any(|key| fields.contains_key(key))
}

fn interpret_mapping(fields: &Mapping) -> Result<ImageReference, ParseError> {
    let repository = component(fields, REPOSITORY_KEY)?.ok_or(ParseError::MissingRepository)?;
    let registry = component(fields, REGISTRY_KEY)?;
    let tag = component(fields, TAG_KEY)?;

    match (registry, tag) {
        (None, None) => ImageReference::parse(repository),
        (None, Some(tag)) => ImageReference::parse(&format!("{}:{}", repository, tag)),
        (Some(registry), None) => ImageReference::parse(&format!("{}/{}", registry, repository)),
        (Some(registry), Some(tag)) => Ok(ImageReference {
            domain: Some(registry.to_string()),
            repository: repository.to_string(),
            tag: Some(tag.to_string()),
        }),
    }
}

/// A scalar component of a declaration. Null and empty values count as unset.
fn component<'a>(fields: &'a Mapping, key: &str) -> Result<Option<&'a str>, ParseError> {
    match fields.get(key) {
        None | Some(ValueNode::Absent) => Ok(None),
        Some(ValueNode::Scalar(s)) if s.is_empty() => Ok(None),
        Some(ValueNode::Scalar(s)) => Ok(Some(s)),
        Some(other) => Err(ParseError::MalformedReference(format!(
            "{} must be a scalar, found {}",
            key,
            other.kind()
        ))),
    }
}
