// src/config/model.rs

use serde::Deserialize;

/// Graph manifest as read from a TOML file.
///
/// ```toml
/// [config]
/// device = 0
/// repeat = 1
///
/// [[buffer]]
/// name = "arr"
/// len = 10
///
/// [[node]]
/// name = "k1"
/// kind = "fill"
/// mode = "recorded"
/// buffer = "arr"
/// value = 42
///
/// [[node]]
/// name = "k2"
/// kind = "scale"
/// buffer = "arr"
/// factor = 2
/// after = ["k1"]
/// ```
///
/// Nodes are an array so their order in the file is the insertion order of
/// the graph, which is what the schedule uses to break ties.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub config: EngineSection,

    #[serde(default)]
    pub buffer: Vec<BufferSpec>,

    #[serde(default)]
    pub node: Vec<NodeSpec>,

    #[serde(default)]
    pub edge: Vec<EdgeSpec>,
}

/// Validated manifest.
///
/// Only produced through `Manifest::try_from(RawManifest)`.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub config: EngineSection,
    pub buffer: Vec<BufferSpec>,
    pub node: Vec<NodeSpec>,
    pub edge: Vec<EdgeSpec>,
}

impl Manifest {
    pub(crate) fn new_unchecked(raw: RawManifest) -> Self {
        Self {
            config: raw.config,
            buffer: raw.buffer,
            node: raw.node,
            edge: raw.edge,
        }
    }

    pub fn buffer(&self, name: &str) -> Option<&BufferSpec> {
        self.buffer.iter().find(|b| b.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.node.iter().find(|n| n.name == name)
    }

    /// Whether any node is recorded through a queue.
    pub fn has_recorded_nodes(&self) -> bool {
        self.node.iter().any(|n| n.mode == NodeMode::Recorded)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Ordinal of the simulated device the native context is created for.
    #[serde(default)]
    pub device: u32,

    /// How many times the executable graph is submitted.
    #[serde(default = "default_repeat")]
    pub repeat: usize,
}

fn default_repeat() -> usize {
    1
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            device: 0,
            repeat: default_repeat(),
        }
    }
}

/// `[[buffer]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferSpec {
    pub name: String,
    pub len: usize,
    #[serde(default)]
    pub init: i64,
}

/// What a manifest node does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKindSpec {
    /// Set every cell of `buffer` to `value`.
    Fill,
    /// Copy `src` into `dst` (`len` cells, default the whole of `src`).
    Copy,
    /// Kernel: multiply every cell of `buffer` by `factor`.
    Scale,
    /// Kernel: add `value` to every cell of `buffer`.
    Add,
    /// Kernel: write each cell's index into `buffer`.
    Iota,
    /// Host task that logs `message`.
    Host,
    Empty,
}

/// How a node enters the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Submitted through a recording queue; chained after the previous
    /// recorded node.
    Recorded,
    /// Added with `Graph::add`.
    #[default]
    Explicit,
}

/// `[[node]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKindSpec,

    #[serde(default)]
    pub mode: NodeMode,

    #[serde(default)]
    pub buffer: Option<String>,

    #[serde(default)]
    pub src: Option<String>,

    #[serde(default)]
    pub dst: Option<String>,

    #[serde(default)]
    pub value: Option<i64>,

    #[serde(default)]
    pub factor: Option<i64>,

    /// Cell count for `copy`.
    #[serde(default)]
    pub len: Option<usize>,

    #[serde(default)]
    pub message: Option<String>,

    /// Earlier nodes this one depends on.
    #[serde(default)]
    pub after: Vec<String>,
}

/// `[[edge]]` entry: `from` completes before `to` begins.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}
