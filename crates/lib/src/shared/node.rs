//! Wrapper state and integration machinery shared by `Map`, `Array` and
//! `Text`.
//!
//! A wrapper is a cheap handle around one [`NodeState`]: either *detached*,
//! carrying preliminary content, or *integrated*, bound to an engine node of
//! its owning document. Integration happens inside a write transaction and
//! recursively moves preliminary content into the engine; from then on the
//! wrapper is registered in the identity cache so every future read of the
//! same node resolves to it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    document::Document,
    engine::{
        self, ArrayOps, ArrayPrelim, ArrayRef, GetString, MapOps, MapPrelim, MapRef, NodeId, Out,
        TextOps, TextPrelim, TextRef, WriteTxnInner,
    },
    identity::identity_cache,
    shared::{Array, Map, RootKind, Text, Value, errors::SharedTypeError},
    transaction::{Transaction, with_read_txn},
};

/// Handle to one wrapper's shared state.
///
/// `Arc` pointer identity of this handle *is* the wrapper identity the
/// identity cache preserves.
#[doc(hidden)]
#[derive(Clone)]
pub struct NodeHandle(pub(crate) Arc<Mutex<NodeState>>);

impl NodeHandle {
    pub(crate) fn detached(prelim: Prelim) -> Self {
        NodeHandle(Arc::new(Mutex::new(NodeState::Detached(prelim))))
    }

    pub(crate) fn ptr_eq(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn is_integrated(&self) -> bool {
        matches!(*self.0.lock().unwrap(), NodeState::Integrated(_))
    }

    /// Preliminary content as plain data, `None` once integrated.
    pub(crate) fn plain_preview(&self) -> Option<Value> {
        match &*self.0.lock().unwrap() {
            NodeState::Detached(prelim) => Some(prelim_to_plain(prelim)),
            NodeState::Integrated(_) => None,
        }
    }
}

pub(crate) enum NodeState {
    Detached(Prelim),
    Integrated(IntegratedNode),
}

pub(crate) struct IntegratedNode {
    pub(crate) doc: Document,
    pub(crate) node: EngineNode,
}

#[derive(Clone)]
pub(crate) enum EngineNode {
    Map(MapRef),
    Array(ArrayRef),
    Text(TextRef),
}

impl EngineNode {
    pub(crate) fn node_id(&self) -> NodeId {
        match self {
            EngineNode::Map(node) => engine::node_id(node),
            EngineNode::Array(node) => engine::node_id(node),
            EngineNode::Text(node) => engine::node_id(node),
        }
    }

    pub(crate) fn kind(&self) -> RootKind {
        match self {
            EngineNode::Map(_) => RootKind::Map,
            EngineNode::Array(_) => RootKind::Array,
            EngineNode::Text(_) => RootKind::Text,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        self.kind().type_name()
    }
}

/// Preliminary content of a detached wrapper.
pub(crate) enum Prelim {
    Map(Vec<(String, Value)>),
    Array(Vec<Value>),
    Text(String),
}

impl Prelim {
    fn kind(&self) -> RootKind {
        match self {
            Prelim::Map(_) => RootKind::Map,
            Prelim::Array(_) => RootKind::Array,
            Prelim::Text(_) => RootKind::Text,
        }
    }
}

/// Resolve an integrated engine node to its one live wrapper handle,
/// constructing and remembering a fresh one when none is alive.
pub(crate) fn wrap_node(doc: &Document, node: EngineNode) -> NodeHandle {
    let node_id = node.node_id();
    let handle = identity_cache().lookup_or_create(doc.guid(), node_id, || {
        Arc::new(Mutex::new(NodeState::Integrated(IntegratedNode {
            doc: doc.clone(),
            node: node.clone(),
        })))
    });
    NodeHandle(handle)
}

/// Convert an engine read result into a value, resolving shared nodes
/// through the identity cache.
pub(crate) fn out_to_value(doc: &Document, out: Out) -> Value {
    match out {
        Out::Any(any) => Value::from_any(&any),
        Out::YMap(node) => Value::Map(Map::from_node(wrap_node(doc, EngineNode::Map(node)))),
        Out::YArray(node) => Value::Array(Array::from_node(wrap_node(doc, EngineNode::Array(node)))),
        Out::YText(node) => Value::Text(Text::from_node(wrap_node(doc, EngineNode::Text(node)))),
        Out::YDoc(subdoc) => Value::Doc(Document::from_engine_doc(subdoc)),
        _ => Value::Null,
    }
}

/// Insert `value` at `key`, integrating detached wrappers recursively.
pub(crate) fn insert_into_map(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    map: &MapRef,
    key: &str,
    value: Value,
) -> Result<(), SharedTypeError> {
    match value {
        Value::Map(wrapper) => {
            let items = take_map_prelim(wrapper.node_handle())?;
            let node: MapRef = map.insert(txn, key, MapPrelim::default());
            integrate_map(doc, txn, wrapper.node_handle(), node, items)
        }
        Value::Array(wrapper) => {
            let items = take_array_prelim(wrapper.node_handle())?;
            let node: ArrayRef = map.insert(txn, key, ArrayPrelim::default());
            integrate_array(doc, txn, wrapper.node_handle(), node, items)
        }
        Value::Text(wrapper) => {
            let content = take_text_prelim(wrapper.node_handle())?;
            let node: TextRef = map.insert(txn, key, TextPrelim::new(""));
            integrate_text(doc, txn, wrapper.node_handle(), node, content)
        }
        Value::Doc(subdoc) => {
            map.insert(txn, key, subdoc.engine_doc());
            Ok(())
        }
        plain => {
            if let Some(any) = plain.to_any() {
                map.insert(txn, key, any);
            }
            Ok(())
        }
    }
}

/// Insert `value` at `index`, integrating detached wrappers recursively.
pub(crate) fn insert_into_array(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    array: &ArrayRef,
    index: u32,
    value: Value,
) -> Result<(), SharedTypeError> {
    match value {
        Value::Map(wrapper) => {
            let items = take_map_prelim(wrapper.node_handle())?;
            let node: MapRef = array.insert(txn, index, MapPrelim::default());
            integrate_map(doc, txn, wrapper.node_handle(), node, items)
        }
        Value::Array(wrapper) => {
            let items = take_array_prelim(wrapper.node_handle())?;
            let node: ArrayRef = array.insert(txn, index, ArrayPrelim::default());
            integrate_array(doc, txn, wrapper.node_handle(), node, items)
        }
        Value::Text(wrapper) => {
            let content = take_text_prelim(wrapper.node_handle())?;
            let node: TextRef = array.insert(txn, index, TextPrelim::new(""));
            integrate_text(doc, txn, wrapper.node_handle(), node, content)
        }
        Value::Doc(subdoc) => {
            array.insert(txn, index, subdoc.engine_doc());
            Ok(())
        }
        plain => {
            if let Some(any) = plain.to_any() {
                array.insert(txn, index, any);
            }
            Ok(())
        }
    }
}

/// Integrate a detached wrapper as the named document root.
pub(crate) fn integrate_root(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    name: &str,
    handle: &NodeHandle,
) -> Result<(), SharedTypeError> {
    let kind = match &*handle.0.lock().unwrap() {
        NodeState::Detached(prelim) => prelim.kind(),
        NodeState::Integrated(_) => return Err(SharedTypeError::AlreadyIntegrated),
    };
    match kind {
        RootKind::Map => {
            let items = take_map_prelim(handle)?;
            let node = engine::root_map(txn, name);
            integrate_map(doc, txn, handle, node, items)
        }
        RootKind::Array => {
            let items = take_array_prelim(handle)?;
            let node = engine::root_array(txn, name);
            integrate_array(doc, txn, handle, node, items)
        }
        RootKind::Text => {
            let content = take_text_prelim(handle)?;
            let node = engine::root_text(txn, name);
            integrate_text(doc, txn, handle, node, content)
        }
    }
}

fn integrate_map(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    handle: &NodeHandle,
    node: MapRef,
    items: Vec<(String, Value)>,
) -> Result<(), SharedTypeError> {
    adopt(doc, handle, EngineNode::Map(node.clone()));
    for (key, value) in items {
        insert_into_map(doc, txn, &node, &key, value)?;
    }
    Ok(())
}

fn integrate_array(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    handle: &NodeHandle,
    node: ArrayRef,
    items: Vec<Value>,
) -> Result<(), SharedTypeError> {
    adopt(doc, handle, EngineNode::Array(node.clone()));
    for (index, value) in items.into_iter().enumerate() {
        insert_into_array(doc, txn, &node, index as u32, value)?;
    }
    Ok(())
}

fn integrate_text(
    doc: &Document,
    txn: &mut WriteTxnInner<'_>,
    handle: &NodeHandle,
    node: TextRef,
    content: String,
) -> Result<(), SharedTypeError> {
    adopt(doc, handle, EngineNode::Text(node.clone()));
    if !content.is_empty() {
        node.insert(txn, 0, &content);
    }
    Ok(())
}

/// Flip a wrapper to integrated and register its identity, so nested reads
/// inside the same transaction already resolve to it.
fn adopt(doc: &Document, handle: &NodeHandle, node: EngineNode) {
    identity_cache().register(doc.guid(), node.node_id(), &handle.0);
    *handle.0.lock().unwrap() = NodeState::Integrated(IntegratedNode {
        doc: doc.clone(),
        node,
    });
}

fn take_map_prelim(handle: &NodeHandle) -> Result<Vec<(String, Value)>, SharedTypeError> {
    match &mut *handle.0.lock().unwrap() {
        NodeState::Detached(Prelim::Map(items)) => Ok(std::mem::take(items)),
        NodeState::Detached(prelim) => Err(SharedTypeError::TypeMismatch {
            expected: RootKind::Map.type_name(),
            found: prelim.kind().type_name(),
        }),
        NodeState::Integrated(_) => Err(SharedTypeError::AlreadyIntegrated),
    }
}

fn take_array_prelim(handle: &NodeHandle) -> Result<Vec<Value>, SharedTypeError> {
    match &mut *handle.0.lock().unwrap() {
        NodeState::Detached(Prelim::Array(items)) => Ok(std::mem::take(items)),
        NodeState::Detached(prelim) => Err(SharedTypeError::TypeMismatch {
            expected: RootKind::Array.type_name(),
            found: prelim.kind().type_name(),
        }),
        NodeState::Integrated(_) => Err(SharedTypeError::AlreadyIntegrated),
    }
}

fn take_text_prelim(handle: &NodeHandle) -> Result<String, SharedTypeError> {
    match &mut *handle.0.lock().unwrap() {
        NodeState::Detached(Prelim::Text(content)) => Ok(std::mem::take(content)),
        NodeState::Detached(prelim) => Err(SharedTypeError::TypeMismatch {
            expected: RootKind::Text.type_name(),
            found: prelim.kind().type_name(),
        }),
        NodeState::Integrated(_) => Err(SharedTypeError::AlreadyIntegrated),
    }
}

/// Resolve a wrapper handle to its document and map node.
pub(crate) fn integrated_as_map(handle: &NodeHandle) -> Result<(Document, MapRef), SharedTypeError> {
    match &*handle.0.lock().unwrap() {
        NodeState::Integrated(node) => match &node.node {
            EngineNode::Map(map) => Ok((node.doc.clone(), map.clone())),
            other => Err(SharedTypeError::TypeMismatch {
                expected: RootKind::Map.type_name(),
                found: other.kind_name(),
            }),
        },
        NodeState::Detached(_) => Err(SharedTypeError::Detached),
    }
}

/// Resolve a wrapper handle to its document and sequence node.
pub(crate) fn integrated_as_array(
    handle: &NodeHandle,
) -> Result<(Document, ArrayRef), SharedTypeError> {
    match &*handle.0.lock().unwrap() {
        NodeState::Integrated(node) => match &node.node {
            EngineNode::Array(array) => Ok((node.doc.clone(), array.clone())),
            other => Err(SharedTypeError::TypeMismatch {
                expected: RootKind::Array.type_name(),
                found: other.kind_name(),
            }),
        },
        NodeState::Detached(_) => Err(SharedTypeError::Detached),
    }
}

/// Resolve a wrapper handle to its document and text node.
pub(crate) fn integrated_as_text(
    handle: &NodeHandle,
) -> Result<(Document, TextRef), SharedTypeError> {
    match &*handle.0.lock().unwrap() {
        NodeState::Integrated(node) => match &node.node {
            EngineNode::Text(text) => Ok((node.doc.clone(), text.clone())),
            other => Err(SharedTypeError::TypeMismatch {
                expected: RootKind::Text.type_name(),
                found: other.kind_name(),
            }),
        },
        NodeState::Detached(_) => Err(SharedTypeError::Detached),
    }
}

pub(crate) fn map_keys(txn: &Transaction<'_>, map: &MapRef) -> Vec<String> {
    with_read_txn!(txn, |t| map.keys(t).map(|key| key.to_string()).collect())
}

pub(crate) fn map_get_out(txn: &Transaction<'_>, map: &MapRef, key: &str) -> Option<Out> {
    with_read_txn!(txn, |t| map.get(t, key))
}

pub(crate) fn map_len(txn: &Transaction<'_>, map: &MapRef) -> u32 {
    with_read_txn!(txn, |t| map.len(t))
}

pub(crate) fn array_len(txn: &Transaction<'_>, array: &ArrayRef) -> u32 {
    with_read_txn!(txn, |t| array.len(t))
}

pub(crate) fn array_get_out(txn: &Transaction<'_>, array: &ArrayRef, index: u32) -> Option<Out> {
    with_read_txn!(txn, |t| array.get(t, index))
}

pub(crate) fn text_len(txn: &Transaction<'_>, text: &TextRef) -> u32 {
    with_read_txn!(txn, |t| text.len(t))
}

pub(crate) fn text_string(txn: &Transaction<'_>, text: &TextRef) -> String {
    with_read_txn!(txn, |t| text.get_string(t))
}

/// Deep-convert an integrated node to plain data.
pub(crate) fn node_to_plain(txn: &Transaction<'_>, node: &EngineNode) -> Value {
    match node {
        EngineNode::Map(map) => {
            let mut object = HashMap::new();
            for key in map_keys(txn, map) {
                if let Some(out) = map_get_out(txn, map, &key) {
                    let value = out_to_plain(txn, out);
                    object.insert(key, value);
                }
            }
            Value::Object(object)
        }
        EngineNode::Array(array) => {
            let len = array_len(txn, array);
            let mut items = Vec::with_capacity(len as usize);
            for index in 0..len {
                if let Some(out) = array_get_out(txn, array, index) {
                    items.push(out_to_plain(txn, out));
                }
            }
            Value::List(items)
        }
        EngineNode::Text(text) => Value::String(text_string(txn, text)),
    }
}

/// Deep-convert an engine read result to plain data. Subdocuments and
/// non-data nodes reduce to `Null`.
pub(crate) fn out_to_plain(txn: &Transaction<'_>, out: Out) -> Value {
    match out {
        Out::Any(any) => Value::from_any(&any),
        Out::YMap(map) => node_to_plain(txn, &EngineNode::Map(map)),
        Out::YArray(array) => node_to_plain(txn, &EngineNode::Array(array)),
        Out::YText(text) => node_to_plain(txn, &EngineNode::Text(text)),
        _ => Value::Null,
    }
}

/// Convert a value that is about to be removed. Plain data and shared nodes
/// reduce to plain data (read while still reachable); subdocuments come back
/// as document handles.
pub(crate) fn removed_to_value(txn: &Transaction<'_>, out: Out) -> Value {
    match out {
        Out::YDoc(subdoc) => Value::Doc(Document::from_engine_doc(subdoc)),
        other => out_to_plain(txn, other),
    }
}

fn prelim_to_plain(prelim: &Prelim) -> Value {
    match prelim {
        Prelim::Map(items) => Value::Object(
            items
                .iter()
                .map(|(key, value)| (key.clone(), value_to_plain_shallow(value)))
                .collect(),
        ),
        Prelim::Array(items) => Value::List(items.iter().map(value_to_plain_shallow).collect()),
        Prelim::Text(content) => Value::String(content.clone()),
    }
}

fn value_to_plain_shallow(value: &Value) -> Value {
    match value {
        Value::Map(wrapper) => wrapper
            .node_handle()
            .plain_preview()
            .unwrap_or(Value::Null),
        Value::Array(wrapper) => wrapper
            .node_handle()
            .plain_preview()
            .unwrap_or(Value::Null),
        Value::Text(wrapper) => wrapper
            .node_handle()
            .plain_preview()
            .unwrap_or(Value::Null),
        Value::Doc(_) => Value::Null,
        plain => plain.clone(),
    }
}
