// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! The road network used by [GraphRouter](crate::GraphRouter).
//!
//! A [Graph] is stored in a [Container](crate::Container) as the
//! [SECTION_NAME] section, with the following big-endian layout:
//!
//! - `u8` version (= 1),
//! - `u32` node count, then for every node: `i64` id, `f64` latitude,
//!   `f64` longitude, `u32` edge count and the edges (`i64` to, `f32` cost),
//! - `u32` foreign node count, then for every foreign node: `i64` id,
//!   `u8` country name length and the UTF-8 country name.

use std::collections::btree_map::{BTreeMap, Entry};

use crate::container::payload::{Reader, Truncated};
use crate::container::{self, SectionSource};
use crate::{earth_distance, Edge, LatLon, Node};

pub const SECTION_NAME: &str = "road_graph";

const VERSION: u8 = 1;

/// Error which can occur when loading a [Graph] from a container.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Container(#[from] container::Error),

    #[error("missing {SECTION_NAME:?} section")]
    MissingSection,

    #[error("unsupported graph version: {0}")]
    UnsupportedVersion(u8),

    #[error("graph section is truncated")]
    Truncated,

    #[error("graph section has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("invalid node id: {0}")]
    InvalidNodeId(i64),

    #[error("invalid country name of foreign node {0}")]
    InvalidCountryName(i64),
}

impl From<Truncated> for Error {
    fn from(_: Truncated) -> Self {
        Error::Truncated
    }
}

/// A road network: [Nodes](Node), one-way [Edges](Edge) between them, and
/// foreign nodes.
///
/// Foreign nodes lie in a region whose map is not available. They have no
/// position or edges of their own; edges leading to them can't be traversed,
/// but tell the router which country's map is missing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Graph {
    nodes: BTreeMap<i64, (Node, Vec<Edge>)>,
    foreign: BTreeMap<i64, String>,
}

impl Graph {
    /// Loads the graph from the [SECTION_NAME] section.
    pub fn load(source: &dyn SectionSource) -> Result<Self, Error> {
        let data = source.read_section(SECTION_NAME)?.ok_or(Error::MissingSection)?;
        Self::decode(&data)
    }

    /// Returns the number of nodes in the graph, not counting foreign nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns an iterator over all [Nodes](Node) in the graph.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(|(node, _)| node)
    }

    /// Retrieves a [Node] with the provided id.
    pub fn get_node(&self, id: i64) -> Option<Node> {
        self.nodes.get(&id).map(|&(node, _)| node)
    }

    /// Creates or updates a [Node] with `node.id`, keeping its outgoing edges.
    ///
    /// Moving an existing node may break the [Edge] cost invariant.
    pub fn set_node(&mut self, node: Node) {
        assert_ne!(node.id, 0);

        match self.nodes.entry(node.id) {
            Entry::Vacant(e) => {
                e.insert((node, Vec::default()));
            }
            Entry::Occupied(mut e) => e.get_mut().0 = node,
        }
        self.foreign.remove(&node.id);
    }

    /// Deletes a [Node] with a given `id` together with its outgoing edges.
    /// Incoming edges are preserved.
    pub fn delete_node(&mut self, id: i64) {
        self.nodes.remove(&id);
    }

    /// Marks `id` as a node of `country`, whose map is absent.
    ///
    /// A regular node with the same id is removed.
    pub fn set_foreign_node<S: Into<String>>(&mut self, id: i64, country: S) {
        assert_ne!(id, 0);
        self.nodes.remove(&id);
        self.foreign.insert(id, country.into());
    }

    /// Returns the country of a foreign node, or `None` if `id` isn't foreign.
    pub fn foreign_country(&self, id: i64) -> Option<&str> {
        self.foreign.get(&id).map(String::as_str)
    }

    /// Finds the closest [Node] to the given position.
    ///
    /// This function requires computing the distance to every [Node] in the graph,
    /// and is not suitable for large graphs; see [KDTree](crate::KDTree).
    pub fn find_nearest_node(&self, position: LatLon) -> Option<Node> {
        self.iter()
            .map(|&nd| (earth_distance(position, nd.position), nd))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, nd)| nd)
    }

    /// Gets all outgoing [Edges](Edge) from a node with a given id.
    pub fn get_edges(&self, from_id: i64) -> &[Edge] {
        self.nodes
            .get(&from_id)
            .map(|(_, e)| e.as_slice())
            .unwrap_or_default()
    }

    /// Gets the cost of an [Edge] from one node to another.
    /// If such an edge doesn't exist, returns [f32::INFINITY].
    pub fn get_edge(&self, from_id: i64, to_id: i64) -> f32 {
        self.get_edges(from_id)
            .iter()
            .find(|e| e.to == to_id)
            .map(|e| e.cost)
            .unwrap_or(f32::INFINITY)
    }

    /// Creates or updates an [Edge] from a node with a given id.
    /// Does nothing if the `from_id` node doesn't exist.
    pub fn set_edge(&mut self, from_id: i64, edge: Edge) {
        assert_ne!(from_id, 0);
        assert_ne!(edge.to, 0);

        if let Some((_, edges)) = self.nodes.get_mut(&from_id) {
            match edges.iter_mut().find(|e| e.to == edge.to) {
                Some(existing) => *existing = edge,
                None => edges.push(edge),
            }
        }
    }

    /// Adds edges in both directions, with the cost equal to the
    /// distance between the nodes times `factor` (which must be at least 1).
    /// Does nothing unless both nodes exist.
    pub fn connect(&mut self, a: i64, b: i64, factor: f32) {
        let (Some(na), Some(nb)) = (self.get_node(a), self.get_node(b)) else {
            return;
        };
        let cost = earth_distance(na.position, nb.position) as f32 * factor;
        self.set_edge(a, Edge { to: b, cost });
        self.set_edge(b, Edge { to: a, cost });
    }

    /// Removes an edge from one node to another.
    pub fn delete_edge(&mut self, from_id: i64, to_id: i64) {
        if let Some((_, edges)) = self.nodes.get_mut(&from_id) {
            if let Some(idx) = edges.iter().position(|e| e.to == to_id) {
                edges.swap_remove(idx);
            }
        }
    }

    /// Serializes the graph into a section payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut b = vec![VERSION];

        b.extend_from_slice(&(self.nodes.len() as u32).to_be_bytes());
        for (node, edges) in self.nodes.values() {
            b.extend_from_slice(&node.id.to_be_bytes());
            b.extend_from_slice(&node.position.lat.to_be_bytes());
            b.extend_from_slice(&node.position.lon.to_be_bytes());
            b.extend_from_slice(&(edges.len() as u32).to_be_bytes());
            for edge in edges {
                b.extend_from_slice(&edge.to.to_be_bytes());
                b.extend_from_slice(&edge.cost.to_be_bytes());
            }
        }

        b.extend_from_slice(&(self.foreign.len() as u32).to_be_bytes());
        for (id, country) in &self.foreign {
            // Country names are short; anything longer is cut at a char boundary.
            let mut end = country.len().min(u8::MAX as usize);
            while !country.is_char_boundary(end) {
                end -= 1;
            }
            b.extend_from_slice(&id.to_be_bytes());
            b.push(end as u8);
            b.extend_from_slice(&country.as_bytes()[..end]);
        }

        b
    }

    /// Parses a section payload produced by [Graph::encode].
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(data);
        let version = r.u8()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let mut g = Self::default();

        let node_count = r.u32()?;
        for _ in 0..node_count {
            let id = r.i64()?;
            if id == 0 {
                return Err(Error::InvalidNodeId(id));
            }
            let position = LatLon::new(r.f64()?, r.f64()?);
            let edge_count = r.u32()? as usize;

            // Each edge takes 12 bytes; reject counts the payload can't hold
            // before allocating.
            if edge_count > r.remaining() / 12 {
                return Err(Error::Truncated);
            }
            let mut edges = Vec::with_capacity(edge_count);
            for _ in 0..edge_count {
                let to = r.i64()?;
                if to == 0 {
                    return Err(Error::InvalidNodeId(to));
                }
                edges.push(Edge { to, cost: r.f32()? });
            }

            g.nodes.insert(id, (Node { id, position }, edges));
        }

        let foreign_count = r.u32()?;
        for _ in 0..foreign_count {
            let id = r.i64()?;
            if id == 0 {
                return Err(Error::InvalidNodeId(id));
            }
            let len = r.u8()? as usize;
            let name = std::str::from_utf8(r.bytes(len)?)
                .map_err(|_| Error::InvalidCountryName(id))?;
            g.foreign.insert(id, name.to_string());
        }

        if !r.is_empty() {
            return Err(Error::TrailingBytes(r.remaining()));
        }
        Ok(g)
    }
}
