use crate::error::{Error, Result};
use crate::precision::Precision;

use core::fmt::{Display, Formatter};

/// Canonical absolute address of a node, e.g. `/`, `/run1/pressure`.
///
/// Both adapters produce and accept the same form, so paths can be compared,
/// logged and used as existence keys regardless of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(String);

impl NodePath {
    pub fn root() -> Self {
        NodePath("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name segments from the root down, empty for the root itself.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(NodePath::root()),
            Some(i) => Some(NodePath(self.0[..i].to_string())),
        }
    }

    /// Appends a validated child name.
    pub fn join(&self, name: &str) -> Result<NodePath> {
        validate_name(name)?;
        if self.is_root() {
            Ok(NodePath(format!("/{}", name)))
        } else {
            Ok(NodePath(format!("{}/{}", self.0, name)))
        }
    }

    /// Parses an absolute path, validating every segment.
    pub fn parse(path: &str) -> Result<NodePath> {
        if !path.starts_with('/') {
            return Err(Error::InvalidName(path.to_string()));
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(NodePath::root());
        }
        trimmed[1..]
            .split('/')
            .try_fold(NodePath::root(), |acc, seg| acc.join(seg))
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Node names are single path segments. Names a Zarr store keeps for itself
/// (`zarr.json`, anything starting with `__`) are refused for every backend.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name == "zarr.json"
        || name.starts_with("__")
        || name.contains('/')
    {
        Err(Error::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Anything that lives at a [`NodePath`].
pub trait Node {
    fn path(&self) -> &NodePath;

    fn name(&self) -> Option<&str> {
        self.path().name()
    }
}

/// Reference to a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupRef {
    path: NodePath,
}

impl GroupRef {
    pub fn root() -> Self {
        GroupRef { path: NodePath::root() }
    }

    pub(crate) fn new(path: NodePath) -> Self {
        GroupRef { path }
    }
}

impl Node for GroupRef {
    fn path(&self) -> &NodePath {
        &self.path
    }
}

/// How an array was allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Grows along dimension 0 through append.
    Extendable,
    /// Fixed shape, chunked and compressed.
    Compressible,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Extendable => "extendable",
            Layout::Compressible => "compressible",
        }
    }

    pub(crate) fn from_tag(s: &str) -> Option<Self> {
        match s {
            "extendable" => Some(Layout::Extendable),
            "compressible" => Some(Layout::Compressible),
            _ => None,
        }
    }
}

/// Reference to an array, with its metadata as of when the reference was taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    path: NodePath,
    precision: Precision,
    shape: Vec<usize>,
    layout: Layout,
}

impl ArrayRef {
    pub(crate) fn new(path: NodePath, info: ArrayInfo) -> Self {
        ArrayRef {
            path,
            precision: info.precision,
            shape: info.shape,
            layout: info.layout,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Shape snapshot. Use `FileHandle::shape` for the live value.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn tail_shape(&self) -> &[usize] {
        self.shape.get(1..).unwrap_or(&[])
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_extendable(&self) -> bool {
        self.layout == Layout::Extendable
    }
}

impl Node for ArrayRef {
    fn path(&self) -> &NodePath {
        &self.path
    }
}

/// Array metadata as reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayInfo {
    pub precision: Precision,
    pub shape: Vec<usize>,
    pub layout: Layout,
}

/// Either kind of node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Group(GroupRef),
    Array(ArrayRef),
}

impl NodeRef {
    pub fn as_group(&self) -> Option<&GroupRef> {
        match self {
            NodeRef::Group(g) => Some(g),
            NodeRef::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            NodeRef::Array(a) => Some(a),
            NodeRef::Group(_) => None,
        }
    }

    pub fn into_array(self) -> Result<ArrayRef> {
        match self {
            NodeRef::Array(a) => Ok(a),
            NodeRef::Group(g) => Err(Error::NodeKind {
                path: g.path.to_string(),
                expected: "array",
            }),
        }
    }

    pub fn into_group(self) -> Result<GroupRef> {
        match self {
            NodeRef::Group(g) => Ok(g),
            NodeRef::Array(a) => Err(Error::NodeKind {
                path: a.path.to_string(),
                expected: "group",
            }),
        }
    }
}

impl Node for NodeRef {
    fn path(&self) -> &NodePath {
        match self {
            NodeRef::Group(g) => g.path(),
            NodeRef::Array(a) => a.path(),
        }
    }
}

impl From<GroupRef> for NodeRef {
    fn from(g: GroupRef) -> Self {
        NodeRef::Group(g)
    }
}

impl From<ArrayRef> for NodeRef {
    fn from(a: ArrayRef) -> Self {
        NodeRef::Array(a)
    }
}

/// Turns a `(name, group)` address into a canonical [`NodePath`].
///
/// A missing group means the container root. Adapters map the result onto
/// their native addressing: the HDF5 adapter walks group handles along
/// [`NodePath::segments`], the Zarr adapter uses the string form as node
/// path and store prefix.
pub struct PathResolver;

impl PathResolver {
    pub fn resolve(name: &str, group: Option<&GroupRef>) -> Result<NodePath> {
        group.map_or_else(NodePath::root, |g| g.path().clone()).join(name)
    }

    pub fn parent(group: Option<&GroupRef>) -> NodePath {
        group.map_or_else(NodePath::root, |g| g.path().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_resolve() {
        let p = PathResolver::resolve("pressure", None).unwrap();
        assert_eq!(p.as_str(), "/pressure");
        assert_eq!(p, PathResolver::resolve("pressure", None).unwrap());

        let g = GroupRef::new(NodePath::parse("/run1/mics").unwrap());
        let q = PathResolver::resolve("pressure", Some(&g)).unwrap();
        assert_eq!(q.as_str(), "/run1/mics/pressure");
        assert_eq!(q.segments().collect::<Vec<_>>(), ["run1", "mics", "pressure"]);
        assert_eq!(q.name(), Some("pressure"));
        assert_ne!(p, q);

        let root = GroupRef::root();
        assert_eq!(PathResolver::resolve("pressure", Some(&root)).unwrap(), p);
    }

    #[test]
    fn test_unambiguous() {
        // "a_b" under root and "b" under "/a_" must not collide
        let g = GroupRef::new(NodePath::parse("/a_").unwrap());
        let x = PathResolver::resolve("a_b", None).unwrap();
        let y = PathResolver::resolve("b", Some(&g)).unwrap();
        assert_ne!(x, y);
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", "a/b", "/a", "zarr.json", "__meta", "__"] {
            let err = PathResolver::resolve(name, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{name}");
        }
        assert!(NodePath::parse("relative").is_err());
        assert!(NodePath::parse("/a//b").is_err());
        assert!(NodePath::parse("/a/zarr.json").is_err());
        for name in ["_private", "a__b", "zarr", "zarr.json.bak"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_parent() {
        let p = NodePath::parse("/a/b/c/").unwrap();
        assert_eq!(p.as_str(), "/a/b/c");
        assert_eq!(p.parent().unwrap().as_str(), "/a/b");
        assert_eq!(NodePath::parse("/a").unwrap().parent(), Some(NodePath::root()));
        assert_eq!(NodePath::root().parent(), None);
        assert_eq!(NodePath::root().name(), None);
        assert_eq!(PathResolver::parent(None), NodePath::root());
    }

    proptest! {
        #[test]
        fn test_resolve_injective(
            a in proptest::collection::vec("_?[a-z][a-z_]{0,2}", 1..4),
            b in proptest::collection::vec("_?[a-z][a-z_]{0,2}", 1..4),
        ) {
            let resolve = |segs: &[String]| {
                let (name, parents) = segs.split_last().unwrap();
                let group = parents
                    .iter()
                    .try_fold(NodePath::root(), |acc, s| acc.join(s))
                    .map(GroupRef::new)
                    .unwrap();
                PathResolver::resolve(name, Some(&group)).unwrap()
            };
            prop_assert_eq!(resolve(&a) == resolve(&b), a == b);
            prop_assert_eq!(NodePath::parse(resolve(&a).as_str()).unwrap(), resolve(&a));
        }
    }
}
