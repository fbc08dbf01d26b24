// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{Manifest, NodeKindSpec, NodeSpec, RawManifest};
use crate::errors::{GraphError, Result};

impl TryFrom<RawManifest> for Manifest {
    type Error = crate::errors::GraphError;

    fn try_from(raw: RawManifest) -> std::result::Result<Self, Self::Error> {
        validate_raw_manifest(&raw)?;
        Ok(Manifest::new_unchecked(raw))
    }
}

fn validate_raw_manifest(m: &RawManifest) -> Result<()> {
    ensure_has_nodes(m)?;
    validate_engine_section(m)?;
    let buffers = validate_buffers(m)?;
    validate_nodes(m, &buffers)?;
    validate_edges(m)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> GraphError {
    GraphError::ConfigError(msg.into())
}

fn ensure_has_nodes(m: &RawManifest) -> Result<()> {
    if m.node.is_empty() {
        return Err(config_error(
            "manifest must contain at least one [[node]] entry",
        ));
    }
    Ok(())
}

fn validate_engine_section(m: &RawManifest) -> Result<()> {
    if m.config.repeat == 0 {
        return Err(config_error("[config].repeat must be >= 1 (got 0)"));
    }
    Ok(())
}

/// Returns buffer name -> length.
fn validate_buffers(m: &RawManifest) -> Result<Vec<(&str, usize)>> {
    let mut seen = HashSet::new();
    let mut buffers = Vec::with_capacity(m.buffer.len());
    for b in &m.buffer {
        if !seen.insert(b.name.as_str()) {
            return Err(config_error(format!("duplicate buffer name '{}'", b.name)));
        }
        buffers.push((b.name.as_str(), b.len));
    }
    Ok(buffers)
}

fn validate_nodes(m: &RawManifest, buffers: &[(&str, usize)]) -> Result<()> {
    let buffer_len = |node: &str, name: &str| -> Result<usize> {
        buffers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, len)| *len)
            .ok_or_else(|| {
                config_error(format!("node '{node}' references unknown buffer '{name}'"))
            })
    };

    let mut earlier: HashSet<&str> = HashSet::new();
    for node in &m.node {
        if earlier.contains(node.name.as_str()) {
            return Err(config_error(format!("duplicate node name '{}'", node.name)));
        }

        for dep in &node.after {
            if dep == &node.name {
                return Err(config_error(format!(
                    "node '{}' cannot depend on itself in `after`",
                    node.name
                )));
            }
            if !earlier.contains(dep.as_str()) {
                return Err(config_error(format!(
                    "node '{}' has unknown dependency '{}' in `after` (dependencies must be declared earlier)",
                    node.name, dep
                )));
            }
        }

        validate_node_fields(node, &buffer_len)?;
        earlier.insert(node.name.as_str());
    }
    Ok(())
}

fn validate_node_fields(
    node: &NodeSpec,
    buffer_len: &dyn Fn(&str, &str) -> Result<usize>,
) -> Result<()> {
    let require = |field: &str, present: bool| -> Result<()> {
        if present {
            Ok(())
        } else {
            Err(config_error(format!(
                "node '{}' of kind {:?} requires `{}`",
                node.name, node.kind, field
            )))
        }
    };

    match node.kind {
        NodeKindSpec::Fill | NodeKindSpec::Add => {
            require("buffer", node.buffer.is_some())?;
            require("value", node.value.is_some())?;
        }
        NodeKindSpec::Scale => {
            require("buffer", node.buffer.is_some())?;
            require("factor", node.factor.is_some())?;
        }
        NodeKindSpec::Iota => require("buffer", node.buffer.is_some())?,
        NodeKindSpec::Copy => {
            require("src", node.src.is_some())?;
            require("dst", node.dst.is_some())?;
        }
        NodeKindSpec::Host => require("message", node.message.is_some())?,
        NodeKindSpec::Empty => {}
    }

    if let Some(buffer) = &node.buffer {
        buffer_len(&node.name, buffer)?;
    }

    if let (Some(src), Some(dst)) = (&node.src, &node.dst) {
        let src_len = buffer_len(&node.name, src)?;
        let dst_len = buffer_len(&node.name, dst)?;
        let len = node.len.unwrap_or(src_len);
        if len > src_len || len > dst_len {
            return Err(config_error(format!(
                "node '{}' copies {} cells but '{}' has {} and '{}' has {}",
                node.name, len, src, src_len, dst, dst_len
            )));
        }
    }
    Ok(())
}

fn validate_edges(m: &RawManifest) -> Result<()> {
    let names: HashSet<&str> = m.node.iter().map(|n| n.name.as_str()).collect();
    for edge in &m.edge {
        for end in [&edge.from, &edge.to] {
            if !names.contains(end.as_str()) {
                return Err(config_error(format!(
                    "edge {} -> {} references unknown node '{}'",
                    edge.from, edge.to, end
                )));
            }
        }
    }
    Ok(())
}
