#![allow(dead_code)]

use devgraph::config::{
    BufferSpec, EdgeSpec, EngineSection, Manifest, NodeKindSpec, NodeMode, NodeSpec, RawManifest,
};

/// Builder for `Manifest` to simplify test setup.
pub struct ManifestBuilder {
    manifest: RawManifest,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            manifest: RawManifest {
                config: EngineSection::default(),
                buffer: Vec::new(),
                node: Vec::new(),
                edge: Vec::new(),
            },
        }
    }

    pub fn repeat(mut self, repeat: usize) -> Self {
        self.manifest.config.repeat = repeat;
        self
    }

    pub fn device(mut self, device: u32) -> Self {
        self.manifest.config.device = device;
        self
    }

    pub fn with_buffer(mut self, name: &str, len: usize, init: i64) -> Self {
        self.manifest.buffer.push(BufferSpec {
            name: name.to_string(),
            len,
            init,
        });
        self
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.manifest.node.push(node);
        self
    }

    pub fn with_edge(mut self, from: &str, to: &str) -> Self {
        self.manifest.edge.push(EdgeSpec {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// The unvalidated manifest, for exercising validation errors.
    pub fn raw(self) -> RawManifest {
        self.manifest
    }

    pub fn build(self) -> Manifest {
        Manifest::try_from(self.manifest).expect("Failed to build valid manifest from builder")
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeSpec`.
pub struct NodeSpecBuilder {
    node: NodeSpec,
}

impl NodeSpecBuilder {
    pub fn new(name: &str, kind: NodeKindSpec) -> Self {
        Self {
            node: NodeSpec {
                name: name.to_string(),
                kind,
                mode: NodeMode::Explicit,
                buffer: None,
                src: None,
                dst: None,
                value: None,
                factor: None,
                len: None,
                message: None,
                after: vec![],
            },
        }
    }

    pub fn fill(name: &str, buffer: &str, value: i64) -> Self {
        Self::new(name, NodeKindSpec::Fill).buffer(buffer).value(value)
    }

    pub fn scale(name: &str, buffer: &str, factor: i64) -> Self {
        Self::new(name, NodeKindSpec::Scale).buffer(buffer).factor(factor)
    }

    pub fn add(name: &str, buffer: &str, value: i64) -> Self {
        Self::new(name, NodeKindSpec::Add).buffer(buffer).value(value)
    }

    pub fn copy(name: &str, src: &str, dst: &str) -> Self {
        let mut b = Self::new(name, NodeKindSpec::Copy);
        b.node.src = Some(src.to_string());
        b.node.dst = Some(dst.to_string());
        b
    }

    pub fn recorded(mut self) -> Self {
        self.node.mode = NodeMode::Recorded;
        self
    }

    pub fn buffer(mut self, name: &str) -> Self {
        self.node.buffer = Some(name.to_string());
        self
    }

    pub fn value(mut self, value: i64) -> Self {
        self.node.value = Some(value);
        self
    }

    pub fn factor(mut self, factor: i64) -> Self {
        self.node.factor = Some(factor);
        self
    }

    pub fn len(mut self, len: usize) -> Self {
        self.node.len = Some(len);
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.node.message = Some(message.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn build(self) -> NodeSpec {
        self.node
    }
}
