//! Runtime values
//!
//! Values mirror the JSON model plus functions. Local bindings are lazy
//! thunks. Objects are stacks of layers whose fields are evaluated on access
//! against the object they end up in, so `self` and `super` see extensions.

use crate::ast::{Assert, Bind, Expr, Param, Visibility};
use jpoet_core::{EvalError, NativeFunction};
use serde_json::{Number, Value as JsonValue};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Arr(Rc<Vec<Val>>),
    Obj(Rc<ObjVal>),
    Func(Rc<FuncVal>),
}

impl Val {
    pub fn str(s: &str) -> Val {
        Val::Str(Rc::from(s))
    }

    pub fn arr(items: Vec<Val>) -> Val {
        Val::Arr(Rc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::Arr(_) => "array",
            Val::Obj(_) => "object",
            Val::Func(_) => "function",
        }
    }

    pub fn from_json(value: &JsonValue) -> Val {
        match value {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(*b),
            JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Val::str(s),
            JsonValue::Array(items) => Val::arr(items.iter().map(Val::from_json).collect()),
            JsonValue::Object(map) => {
                let mut layer = Layer::default();
                for (key, value) in map {
                    layer.fields.insert(key.clone(), FieldDef::value(Visibility::Inherit, Val::from_json(value)));
                }
                Val::Obj(Rc::new(ObjVal::new(vec![Rc::new(layer)])))
            }
        }
    }
}

#[cfg(test)]
impl std::fmt::Debug for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Val::{}", self.type_name())
    }
}

/// Integral values within the exactly representable range become JSON
/// integers so plugins see `3`, not `3.0`.
pub fn number_to_json(n: f64) -> Result<JsonValue, EvalError> {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        return Ok(JsonValue::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or_else(|| EvalError::runtime(format!("cannot manifest non-finite number {}", n)))
}

pub enum FuncVal {
    Closure {
        params: Vec<Param>,
        body: Arc<Expr>,
        env: Env,
        file: Rc<str>,
    },
    Builtin(&'static str),
    Native(NativeFunction),
}

impl FuncVal {
    pub fn arity(&self) -> usize {
        match self {
            FuncVal::Closure { params, .. } => params.len(),
            FuncVal::Builtin(name) => crate::stdlib::params(name).len(),
            FuncVal::Native(f) => f.params().len(),
        }
    }
}

// ========== Objects ==========

/// How a field's value is produced
pub enum FieldBody {
    /// Evaluated in the literal's scope with `self` bound on access
    Lazy { expr: Arc<Expr>, scope: Rc<ObjScope> },
    Value(Val),
}

pub struct FieldDef {
    pub visibility: Visibility,
    /// `+:` adds to the field inherited from lower layers
    pub plus: bool,
    pub body: FieldBody,
}

impl FieldDef {
    pub fn value(visibility: Visibility, value: Val) -> Self {
        Self { visibility, plus: false, body: FieldBody::Value(value) }
    }
}

/// Scope an object literal's fields and asserts are evaluated in
pub struct ObjScope {
    pub env: Env,
    pub locals: Vec<Bind>,
    pub file: Rc<str>,
}

/// Fields contributed by one object literal
#[derive(Default)]
pub struct Layer {
    pub fields: BTreeMap<String, FieldDef>,
    pub asserts: Vec<Assert>,
    pub scope: Option<Rc<ObjScope>>,
}

/// Layers lowest first; `a + b` stacks the layers of `b` on those of `a`.
pub struct ObjVal {
    layers: Vec<Rc<Layer>>,
    pub(crate) cache: RefCell<HashMap<String, Val>>,
    pub(crate) asserts_checked: Cell<bool>,
}

impl ObjVal {
    pub fn new(layers: Vec<Rc<Layer>>) -> Self {
        let has_asserts = layers.iter().any(|layer| !layer.asserts.is_empty());
        Self {
            layers,
            cache: RefCell::new(HashMap::new()),
            asserts_checked: Cell::new(!has_asserts),
        }
    }

    pub fn layers(&self) -> &[Rc<Layer>] {
        &self.layers
    }

    /// Layers of `self + other`
    pub fn extended_by(&self, other: &ObjVal) -> Vec<Rc<Layer>> {
        self.layers.iter().chain(other.layers.iter()).cloned().collect()
    }

    /// Topmost definition of `name` among the layers below index `below`
    pub fn find(&self, name: &str, below: usize) -> Option<(usize, &FieldDef)> {
        self.layers[..below.min(self.layers.len())]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(idx, layer)| layer.fields.get(name).map(|def| (idx, def)))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.fields.contains_key(name))
    }

    /// The topmost explicit `::` or `:::` decides; plain `:` inherits.
    pub fn visibility(&self, name: &str) -> Option<Visibility> {
        let mut found = None;
        for layer in self.layers.iter().rev() {
            match layer.fields.get(name) {
                Some(def) if def.visibility != Visibility::Inherit => return Some(def.visibility),
                Some(_) => found = Some(Visibility::Inherit),
                None => {}
            }
        }
        found
    }

    pub fn is_visible(&self, name: &str) -> bool {
        matches!(self.visibility(name), Some(v) if v != Visibility::Hidden)
    }

    /// Every field name, sorted
    pub fn field_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.layers.iter().flat_map(|layer| layer.fields.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Field names that appear in manifested output, sorted
    pub fn visible_names(&self) -> Vec<String> {
        self.field_names().into_iter().filter(|name| self.is_visible(name)).collect()
    }
}

// ========== Environments ==========

pub enum ThunkState {
    Pending { expr: Arc<Expr>, env: Env, file: Rc<str> },
    Forcing,
    Done(Val),
}

#[derive(Clone)]
pub struct Thunk(pub Rc<RefCell<ThunkState>>);

impl Thunk {
    pub fn pending(expr: Arc<Expr>, env: Env, file: Rc<str>) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Pending { expr, env, file })))
    }

    pub fn done(val: Val) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Done(val))))
    }
}

/// The object a field is being evaluated for, and the layer the field came from
#[derive(Clone)]
pub struct This {
    pub obj: Rc<ObjVal>,
    pub layer: usize,
}

pub struct Frame {
    vars: RefCell<HashMap<String, Thunk>>,
    this: RefCell<Option<This>>,
    parent: Env,
}

/// Lexical scope chain
#[derive(Clone, Default)]
pub struct Env(Option<Rc<Frame>>);

impl Env {
    /// A new, empty scope nested in this one
    pub fn extend(&self, registry: &Registry) -> Env {
        self.push(None, registry)
    }

    /// A nested scope in which `self` and `super` refer to `this`
    pub fn with_this(&self, this: This, registry: &Registry) -> Env {
        self.push(Some(this), registry)
    }

    fn push(&self, this: Option<This>, registry: &Registry) -> Env {
        let frame = Rc::new(Frame {
            vars: RefCell::new(HashMap::new()),
            this: RefCell::new(this),
            parent: self.clone(),
        });
        registry.track_frame(&frame);
        Env(Some(frame))
    }

    /// Bind in the innermost scope
    pub fn bind(&self, name: impl Into<String>, thunk: Thunk) {
        if let Some(frame) = &self.0 {
            frame.vars.borrow_mut().insert(name.into(), thunk);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Thunk> {
        let mut current = self.0.as_ref();
        while let Some(frame) = current {
            if let Some(thunk) = frame.vars.borrow().get(name) {
                return Some(thunk.clone());
            }
            current = frame.parent.0.as_ref();
        }
        None
    }

    /// Innermost object being evaluated
    pub fn this(&self) -> Option<This> {
        let mut current = self.0.as_ref();
        while let Some(frame) = current {
            if let Some(this) = &*frame.this.borrow() {
                return Some(this.clone());
            }
            current = frame.parent.0.as_ref();
        }
        None
    }
}

// ========== Registry ==========

/// Weak handles to every scope and object of one evaluation.
///
/// Recursive locals, closures and `self` form reference cycles; `sweep`
/// empties the scopes and field caches so the cycles are freed.
#[derive(Default)]
pub struct Registry {
    frames: RefCell<Vec<Weak<Frame>>>,
    objects: RefCell<Vec<Weak<ObjVal>>>,
}

impl Registry {
    fn track_frame(&self, frame: &Rc<Frame>) {
        track(&self.frames, frame);
    }

    pub fn track_object(&self, obj: &Rc<ObjVal>) {
        track(&self.objects, obj);
    }

    pub fn sweep(&self) {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        for frame in frames.iter().filter_map(Weak::upgrade) {
            let vars = std::mem::take(&mut *frame.vars.borrow_mut());
            let this = frame.this.borrow_mut().take();
            drop(vars);
            drop(this);
        }
        let objects = std::mem::take(&mut *self.objects.borrow_mut());
        for obj in objects.iter().filter_map(Weak::upgrade) {
            let cache = std::mem::take(&mut *obj.cache.borrow_mut());
            drop(cache);
        }
    }
}

/// Push, dropping dead handles whenever the list would grow
fn track<T>(list: &RefCell<Vec<Weak<T>>>, item: &Rc<T>) {
    let mut list = list.borrow_mut();
    if list.len() == list.capacity() {
        list.retain(|weak| weak.strong_count() > 0);
    }
    list.push(Rc::downgrade(item));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Pos};
    use serde_json::json;

    fn layer(fields: &[(&str, Visibility, f64)]) -> Rc<Layer> {
        let mut layer = Layer::default();
        for (name, visibility, n) in fields {
            layer.fields.insert(name.to_string(), FieldDef::value(*visibility, Val::Num(*n)));
        }
        Rc::new(layer)
    }

    #[test]
    fn test_json_numbers_stay_integral() {
        assert_eq!(number_to_json(3.0).unwrap(), json!(3));
        assert_eq!(number_to_json(0.5).unwrap(), json!(0.5));
        assert!(number_to_json(f64::INFINITY).is_err());
    }

    #[test]
    fn test_topmost_explicit_visibility_wins() {
        let obj = ObjVal::new(vec![
            layer(&[("a", Visibility::Hidden, 1.0), ("b", Visibility::Inherit, 1.0)]),
            layer(&[("a", Visibility::Inherit, 2.0), ("c", Visibility::Hidden, 3.0)]),
        ]);
        assert_eq!(obj.visibility("a"), Some(Visibility::Hidden));
        assert_eq!(obj.visible_names(), vec!["b".to_string()]);
        assert_eq!(obj.field_names().len(), 3);

        let forced = ObjVal::new(vec![layer(&[("a", Visibility::Hidden, 1.0)]), layer(&[("a", Visibility::Visible, 2.0)])]);
        assert!(forced.is_visible("a"));
    }

    #[test]
    fn test_find_respects_layer_bound() {
        let obj = ObjVal::new(vec![layer(&[("a", Visibility::Inherit, 1.0)]), layer(&[("a", Visibility::Inherit, 2.0)])]);
        assert_eq!(obj.find("a", 2).map(|(idx, _)| idx), Some(1));
        assert_eq!(obj.find("a", 1).map(|(idx, _)| idx), Some(0));
        assert!(obj.find("a", 0).is_none());
    }

    #[test]
    fn test_env_lookup_walks_parents() {
        let registry = Registry::default();
        let root = Env::default().extend(&registry);
        root.bind("x", Thunk::done(Val::Num(1.0)));
        let inner = root.extend(&registry);
        inner.bind("y", Thunk::done(Val::Num(2.0)));
        assert!(inner.lookup("x").is_some());
        assert!(inner.lookup("y").is_some());
        assert!(root.lookup("y").is_none());
        assert!(inner.this().is_none());
    }

    #[test]
    fn test_sweep_frees_self_referencing_scope() {
        let registry = Registry::default();
        let env = Env::default().extend(&registry);
        let body = Arc::new(Expr::new(ExprKind::Var("x".into()), Pos::default()));
        env.bind("x", Thunk::pending(body, env.clone(), Rc::from("t")));
        let frame = match &env.0 {
            Some(frame) => Rc::downgrade(frame),
            None => panic!("extend always creates a frame"),
        };
        drop(env);
        assert!(frame.upgrade().is_some());
        registry.sweep();
        assert!(frame.upgrade().is_none());
    }
}
