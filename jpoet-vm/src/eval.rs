//! Expression evaluator
//!
//! Walks the tree against a scope chain. Object fields are evaluated when
//! they are accessed, with `self` bound to the object being indexed. Imports
//! are resolved through the installed importer and memoized by the path they
//! were found at.

use crate::ast::{
    Arg, Assert, BinOp, CompSpec, Expr, ExprKind, FieldKey, Member, ObjectComp, Pos, Slice, UnaryOp, Visibility,
};
use crate::format;
use crate::parser;
use crate::render;
use crate::stdlib;
use crate::value::{
    number_to_json, Env, FieldBody, FieldDef, FuncVal, Layer, ObjScope, ObjVal, Registry, This, Thunk, ThunkState,
    Val,
};
use jpoet_core::{EvalError, Imported, Importer, Location, NativeFunction};
use serde_json::{Map, Value as JsonValue};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Function calls, thunk forces, field evaluations and imports in flight
pub const MAX_STACK: usize = 500;

/// Nested evaluations of any kind, bounding native stack use
pub const MAX_DEPTH: usize = 10_000;

pub(crate) const STACK_EXCEEDED: &str = "max stack frames exceeded";

pub(crate) struct Interpreter<'a> {
    importer: Option<&'a dyn Importer>,
    natives: &'a HashMap<String, NativeFunction>,
    std_layer: Rc<Layer>,
    imports: RefCell<HashMap<String, Val>>,
    import_strs: RefCell<HashMap<String, Rc<str>>>,
    importing: RefCell<Vec<String>>,
    depth: Cell<usize>,
    stack: Cell<usize>,
    registry: Registry,
}

pub(crate) fn location(file: &str, pos: Pos) -> Location {
    Location { file: file.to_string(), line: pos.line, column: pos.column }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        self.imports.borrow_mut().clear();
        self.registry.sweep();
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(importer: Option<&'a dyn Importer>, natives: &'a HashMap<String, NativeFunction>) -> Self {
        Self {
            importer,
            natives,
            std_layer: Rc::new(stdlib::std_layer()),
            imports: RefCell::new(HashMap::new()),
            import_strs: RefCell::new(HashMap::new()),
            importing: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            stack: Cell::new(0),
            registry: Registry::default(),
        }
    }

    pub fn native(&self, name: &str) -> Option<&NativeFunction> {
        self.natives.get(name)
    }

    /// Top-level scope of a file: only `std` is bound.
    pub fn root_env(&self, file: &Rc<str>) -> Env {
        let mut this_file = Layer::default();
        this_file.fields.insert(
            "thisFile".to_string(),
            FieldDef::value(Visibility::Hidden, Val::Str(file.clone())),
        );
        let std_obj = self.object(vec![self.std_layer.clone(), Rc::new(this_file)]);
        let env = Env::default().extend(&self.registry);
        env.bind("std", Thunk::done(Val::Obj(std_obj)));
        env
    }

    /// Parse and evaluate a whole file in a fresh root scope
    pub fn eval_source(&self, file: &str, source: &str) -> Result<Val, EvalError> {
        let expr = parser::parse(file, source)?;
        let file: Rc<str> = Rc::from(file);
        self.eval(&expr, &self.root_env(&file), &file)
    }

    /// New object from layers, tracked for the end-of-run sweep
    pub fn object(&self, layers: Vec<Rc<Layer>>) -> Rc<ObjVal> {
        let obj = Rc::new(ObjVal::new(layers));
        self.registry.track_object(&obj);
        obj
    }

    /// Object of already computed, plainly visible fields
    pub fn value_object(&self, fields: BTreeMap<String, Val>) -> Val {
        let mut layer = Layer::default();
        for (name, value) in fields {
            layer.fields.insert(name, FieldDef::value(Visibility::Inherit, value));
        }
        Val::Obj(self.object(vec![Rc::new(layer)]))
    }

    // ========== Frames ==========

    fn push_frame(&self) -> Result<(), EvalError> {
        let stack = self.stack.get();
        if stack >= MAX_STACK {
            return Err(EvalError::runtime(STACK_EXCEEDED));
        }
        self.stack.set(stack + 1);
        Ok(())
    }

    fn pop_frame(&self) {
        self.stack.set(self.stack.get().saturating_sub(1));
    }

    fn framed<T>(&self, work: impl FnOnce() -> Result<T, EvalError>) -> Result<T, EvalError> {
        self.push_frame()?;
        let result = work();
        self.pop_frame();
        result
    }

    /// Guard for recursion that does not pass through `eval`
    pub fn descend(&self, depth: usize) -> Result<(), EvalError> {
        if self.depth.get() + depth >= MAX_DEPTH {
            return Err(EvalError::runtime(STACK_EXCEEDED));
        }
        Ok(())
    }

    // ========== Expressions ==========

    pub fn eval(&self, expr: &Expr, env: &Env, file: &Rc<str>) -> Result<Val, EvalError> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(EvalError::runtime(STACK_EXCEEDED).at(location(file, expr.pos)));
        }
        self.depth.set(depth + 1);
        let result = self.eval_inner(expr, env, file);
        self.depth.set(depth);
        result.map_err(|e| e.at(location(file, expr.pos)))
    }

    fn eval_inner(&self, expr: &Expr, env: &Env, file: &Rc<str>) -> Result<Val, EvalError> {
        match &expr.kind {
            ExprKind::Null => Ok(Val::Null),
            ExprKind::Bool(b) => Ok(Val::Bool(*b)),
            ExprKind::Number(n) => Ok(Val::Num(*n)),
            ExprKind::Str(s) => Ok(Val::str(s)),

            ExprKind::Var(name) => match env.lookup(name) {
                Some(thunk) => self.force(&thunk),
                None => Err(EvalError::runtime(format!("unknown variable: {}", name))),
            },

            ExprKind::SelfRef => match env.this() {
                Some(this) => Ok(Val::Obj(this.obj)),
                None => Err(EvalError::runtime("can't use self outside of an object")),
            },

            ExprKind::Dollar => match env.lookup("$") {
                Some(thunk) => self.force(&thunk),
                None => Err(EvalError::runtime("can't use $ outside of an object")),
            },

            ExprKind::SuperIndex(key) => {
                let this = env.this().ok_or_else(|| EvalError::runtime("can't use super outside of an object"))?;
                let key = self.field_name(key, env, file)?;
                self.field_below(&this.obj, &key, this.layer)?
                    .ok_or_else(|| EvalError::runtime(format!("field does not exist in super: {}", key)))
            }

            ExprKind::InSuper(key) => {
                let this = env.this().ok_or_else(|| EvalError::runtime("can't use super outside of an object"))?;
                let key = self.field_name(key, env, file)?;
                Ok(Val::Bool(this.obj.find(&key, this.layer).is_some()))
            }

            ExprKind::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env, file))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Val::arr(values))
            }

            ExprKind::ArrayComp(body, specs) => {
                let mut values = Vec::new();
                self.comprehension(specs, env, file, &mut |scope| {
                    values.push(self.eval(body, scope, file)?);
                    Ok(())
                })?;
                Ok(Val::arr(values))
            }

            ExprKind::Object(members) => self.eval_object(members, env, file),

            ExprKind::ObjectComp(comp) => self.eval_object_comp(comp, env, file),

            ExprKind::Local(binds, body) => {
                let scope = env.extend(&self.registry);
                for bind in binds {
                    scope.bind(bind.name.clone(), Thunk::pending(bind.body.clone(), scope.clone(), file.clone()));
                }
                self.eval(body, &scope, file)
            }

            ExprKind::Function(params, body) => Ok(Val::Func(Rc::new(FuncVal::Closure {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
                file: file.clone(),
            }))),

            ExprKind::Apply(callee, args) => {
                let target = self.eval(callee, env, file)?;
                let (positional, named) = self.eval_args(args, env, file)?;
                self.call(&target, positional, named)
            }

            ExprKind::Index(target, index) => {
                let target = self.eval(target, env, file)?;
                let index = self.eval(index, env, file)?;
                self.index(&target, &index)
            }

            ExprKind::Slice(slice) => self.eval_slice(slice, env, file),

            ExprKind::If(cond, then, otherwise) => match self.eval(cond, env, file)? {
                Val::Bool(true) => self.eval(then, env, file),
                Val::Bool(false) => match otherwise {
                    Some(otherwise) => self.eval(otherwise, env, file),
                    None => Ok(Val::Null),
                },
                other => Err(EvalError::runtime(format!(
                    "condition must be boolean, got {}",
                    other.type_name()
                ))),
            },

            ExprKind::Binary(left, BinOp::And, right) => match self.eval(left, env, file)? {
                Val::Bool(false) => Ok(Val::Bool(false)),
                Val::Bool(true) => expect_bool(self.eval(right, env, file)?, "&&"),
                other => Err(operand_error("&&", &other)),
            },

            ExprKind::Binary(left, BinOp::Or, right) => match self.eval(left, env, file)? {
                Val::Bool(true) => Ok(Val::Bool(true)),
                Val::Bool(false) => expect_bool(self.eval(right, env, file)?, "||"),
                other => Err(operand_error("||", &other)),
            },

            ExprKind::Binary(left, op, right) => {
                let left = self.eval(left, env, file)?;
                let right = self.eval(right, env, file)?;
                self.binary(*op, &left, &right)
            }

            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, env, file)?;
                match (op, value) {
                    (UnaryOp::Neg, Val::Num(n)) => Ok(Val::Num(-n)),
                    (UnaryOp::Plus, Val::Num(n)) => Ok(Val::Num(n)),
                    (UnaryOp::Not, Val::Bool(b)) => Ok(Val::Bool(!b)),
                    (UnaryOp::BitNot, Val::Num(n)) => Ok(Val::Num(!(n as i64) as f64)),
                    (op, other) => Err(EvalError::runtime(format!(
                        "unary operator {} does not operate on type {}",
                        op.symbol(),
                        other.type_name()
                    ))),
                }
            }

            ExprKind::Assert(assert, body) => {
                self.check_assert(assert, env, file)?;
                self.eval(body, env, file)
            }

            ExprKind::Error(message) => {
                let message = self.eval(message, env, file)?;
                Err(EvalError::runtime(self.to_string(&message)?))
            }

            ExprKind::Import(path) => self.import(file, path),

            ExprKind::ImportStr(path) => self.import_str(file, path).map(Val::Str),
        }
    }

    fn field_name(&self, key: &Expr, env: &Env, file: &Rc<str>) -> Result<String, EvalError> {
        match self.eval(key, env, file)? {
            Val::Str(s) => Ok(s.to_string()),
            other => Err(EvalError::runtime(format!("field name must be string, got {}", other.type_name()))),
        }
    }

    pub fn force(&self, thunk: &Thunk) -> Result<Val, EvalError> {
        if let ThunkState::Done(value) = &*thunk.0.borrow() {
            return Ok(value.clone());
        }
        let state = std::mem::replace(&mut *thunk.0.borrow_mut(), ThunkState::Forcing);
        match state {
            ThunkState::Done(value) => {
                *thunk.0.borrow_mut() = ThunkState::Done(value.clone());
                Ok(value)
            }
            ThunkState::Forcing => Err(EvalError::runtime("local binding refers to itself")),
            ThunkState::Pending { expr, env, file } => match self.framed(|| self.eval(&expr, &env, &file)) {
                Ok(value) => {
                    *thunk.0.borrow_mut() = ThunkState::Done(value.clone());
                    Ok(value)
                }
                Err(err) => {
                    *thunk.0.borrow_mut() = ThunkState::Pending { expr, env, file };
                    Err(err)
                }
            },
        }
    }

    fn check_assert(&self, assert: &Assert, env: &Env, file: &Rc<str>) -> Result<(), EvalError> {
        match self.eval(&assert.cond, env, file)? {
            Val::Bool(true) => Ok(()),
            Val::Bool(false) => {
                let message = match &assert.message {
                    Some(message) => {
                        let message = self.eval(message, env, file)?;
                        self.to_string(&message)?
                    }
                    None => "Assertion failed".to_string(),
                };
                Err(EvalError::runtime(message))
            }
            other => Err(EvalError::runtime(format!(
                "assertion condition must be boolean, got {}",
                other.type_name()
            ))),
        }
    }

    /// Runs `emit` once per binding produced by `for` and `if` clauses
    fn comprehension(
        &self,
        specs: &[CompSpec],
        env: &Env,
        file: &Rc<str>,
        emit: &mut dyn FnMut(&Env) -> Result<(), EvalError>,
    ) -> Result<(), EvalError> {
        match specs.split_first() {
            None => emit(env),
            Some((CompSpec::For(name, source), rest)) => {
                let items = match self.eval(source, env, file)? {
                    Val::Arr(items) => items,
                    other => {
                        return Err(EvalError::runtime(format!(
                            "in comprehension, expected array, got {}",
                            other.type_name()
                        ))
                        .at(location(file, source.pos)));
                    }
                };
                for item in items.iter() {
                    let scope = env.extend(&self.registry);
                    scope.bind(name.clone(), Thunk::done(item.clone()));
                    self.comprehension(rest, &scope, file, emit)?;
                }
                Ok(())
            }
            Some((CompSpec::If(cond), rest)) => match self.eval(cond, env, file)? {
                Val::Bool(true) => self.comprehension(rest, env, file, emit),
                Val::Bool(false) => Ok(()),
                other => Err(EvalError::runtime(format!(
                    "comprehension condition must be boolean, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    // ========== Objects ==========

    fn eval_object(&self, members: &[Member], env: &Env, file: &Rc<str>) -> Result<Val, EvalError> {
        let locals = members
            .iter()
            .filter_map(|member| match member {
                Member::Local(bind) => Some(bind.clone()),
                _ => None,
            })
            .collect();
        let scope = Rc::new(ObjScope { env: env.clone(), locals, file: file.clone() });
        let mut layer = Layer::default();
        for member in members {
            let field = match member {
                Member::Field(field) => field,
                Member::Assert(assert) => {
                    layer.asserts.push(assert.clone());
                    continue;
                }
                Member::Local(_) => continue,
            };
            // Field names are evaluated in the enclosing scope
            let key = match &field.key {
                FieldKey::Fixed(name) => name.clone(),
                FieldKey::Computed(key) => match self.eval(key, env, file)? {
                    Val::Str(s) => s.to_string(),
                    // A null computed key omits the field
                    Val::Null => continue,
                    other => {
                        return Err(EvalError::runtime(format!(
                            "field name must be string, got {}",
                            other.type_name()
                        ))
                        .at(location(file, key.pos)));
                    }
                },
            };
            if layer.fields.contains_key(&key) {
                return Err(EvalError::runtime(format!("duplicate field name: {:?}", key))
                    .at(location(file, field.value.pos)));
            }
            let body = FieldBody::Lazy { expr: field.value.clone(), scope: scope.clone() };
            layer.fields.insert(key, FieldDef { visibility: field.visibility, plus: field.plus, body });
        }
        layer.scope = Some(scope);
        Ok(Val::Obj(self.object(vec![Rc::new(layer)])))
    }

    fn eval_object_comp(&self, comp: &ObjectComp, env: &Env, file: &Rc<str>) -> Result<Val, EvalError> {
        let mut layer = Layer::default();
        self.comprehension(&comp.specs, env, file, &mut |scope_env| {
            let key = match self.eval(&comp.key, scope_env, file)? {
                Val::Str(s) => s.to_string(),
                Val::Null => return Ok(()),
                other => {
                    return Err(EvalError::runtime(format!(
                        "field name must be string, got {}",
                        other.type_name()
                    )));
                }
            };
            if layer.fields.contains_key(&key) {
                return Err(EvalError::runtime(format!("duplicate field name: {:?}", key)));
            }
            let scope = Rc::new(ObjScope {
                env: scope_env.clone(),
                locals: comp.locals.clone(),
                file: file.clone(),
            });
            let body = FieldBody::Lazy { expr: comp.value.clone(), scope };
            layer.fields.insert(key, FieldDef { visibility: comp.visibility, plus: comp.plus, body });
            Ok(())
        })?;
        Ok(Val::Obj(self.object(vec![Rc::new(layer)])))
    }

    /// Scope for evaluating a member of `layer` on behalf of `obj`
    fn object_env(&self, obj: &Rc<ObjVal>, layer: usize, scope: &ObjScope) -> Env {
        let env = scope.env.with_this(This { obj: obj.clone(), layer }, &self.registry);
        if scope.env.lookup("$").is_none() {
            env.bind("$", Thunk::done(Val::Obj(obj.clone())));
        }
        for bind in &scope.locals {
            env.bind(bind.name.clone(), Thunk::pending(bind.body.clone(), env.clone(), scope.file.clone()));
        }
        env
    }

    /// Object asserts run once, before the first field is read
    pub fn check_asserts(&self, obj: &Rc<ObjVal>) -> Result<(), EvalError> {
        if obj.asserts_checked.get() {
            return Ok(());
        }
        obj.asserts_checked.set(true);
        for (idx, layer) in obj.layers().iter().enumerate() {
            let scope = match &layer.scope {
                Some(scope) => scope,
                None => continue,
            };
            for assert in &layer.asserts {
                let env = self.object_env(obj, idx, scope);
                if let Err(err) = self.framed(|| self.check_assert(assert, &env, &scope.file)) {
                    obj.asserts_checked.set(false);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, obj: &Rc<ObjVal>, name: &str) -> Result<Val, EvalError> {
        self.check_asserts(obj)?;
        let cached = obj.cache.borrow().get(name).cloned();
        if let Some(value) = cached {
            return Ok(value);
        }
        let value = self
            .field_below(obj, name, obj.layers().len())?
            .ok_or_else(|| EvalError::runtime(format!("field does not exist: {}", name)))?;
        obj.cache.borrow_mut().insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Value of `name` as defined by the layers under index `below`
    fn field_below(&self, obj: &Rc<ObjVal>, name: &str, below: usize) -> Result<Option<Val>, EvalError> {
        let (idx, def) = match obj.find(name, below) {
            Some(found) => found,
            None => return Ok(None),
        };
        let value = match &def.body {
            FieldBody::Value(value) => value.clone(),
            FieldBody::Lazy { expr, scope } => self.framed(|| {
                let env = self.object_env(obj, idx, scope);
                self.eval(expr, &env, &scope.file)
            })?,
        };
        if !def.plus {
            return Ok(Some(value));
        }
        match self.field_below(obj, name, idx)? {
            Some(inherited) => self.binary(BinOp::Add, &inherited, &value).map(Some),
            None => Ok(Some(value)),
        }
    }

    fn eval_args(
        &self,
        args: &[Arg],
        env: &Env,
        file: &Rc<str>,
    ) -> Result<(Vec<Val>, Vec<(String, Val)>), EvalError> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            let value = self.eval(&arg.value, env, file)?;
            match &arg.name {
                Some(name) => named.push((name.clone(), value)),
                None => positional.push(value),
            }
        }
        Ok((positional, named))
    }

    // ========== Indexing ==========

    pub fn index(&self, target: &Val, index: &Val) -> Result<Val, EvalError> {
        match (target, index) {
            (Val::Obj(obj), Val::Str(key)) => self.field(obj, key),
            (Val::Arr(items), Val::Num(n)) => {
                let idx = array_index(*n, items.len())?;
                Ok(items[idx].clone())
            }
            (Val::Str(s), Val::Num(n)) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = array_index(*n, chars.len())?;
                Ok(Val::str(&chars[idx].to_string()))
            }
            (target, index) => Err(EvalError::runtime(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    fn eval_slice(&self, slice: &Slice, env: &Env, file: &Rc<str>) -> Result<Val, EvalError> {
        let target = self.eval(&slice.target, env, file)?;
        let start = self.slice_bound(slice.start.as_ref(), env, file)?;
        let end = self.slice_bound(slice.end.as_ref(), env, file)?;
        let step = match self.slice_bound(slice.step.as_ref(), env, file)? {
            None => 1,
            Some(step) if step > 0 => step as usize,
            Some(step) => return Err(EvalError::runtime(format!("slice step must be positive, got {}", step))),
        };
        match target {
            Val::Arr(items) => Ok(Val::arr(
                slice_indices(items.len(), start, end, step).map(|i| items[i].clone()).collect(),
            )),
            Val::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let text: String = slice_indices(chars.len(), start, end, step).map(|i| chars[i]).collect();
                Ok(Val::str(&text))
            }
            other => Err(EvalError::runtime(format!("cannot slice {}", other.type_name()))),
        }
    }

    fn slice_bound(&self, part: Option<&Expr>, env: &Env, file: &Rc<str>) -> Result<Option<i64>, EvalError> {
        match part {
            None => Ok(None),
            Some(expr) => match self.eval(expr, env, file)? {
                Val::Null => Ok(None),
                Val::Num(n) if n.fract() == 0.0 => Ok(Some(n as i64)),
                other => Err(EvalError::runtime(format!(
                    "slice index must be an integer, got {}",
                    other.type_name()
                ))),
            },
        }
    }

    // ========== Operators ==========

    pub fn binary(&self, op: BinOp, left: &Val, right: &Val) -> Result<Val, EvalError> {
        let mismatch = || {
            EvalError::runtime(format!(
                "binary operator {} does not operate on {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))
        };
        let result = match (op, left, right) {
            (BinOp::Add, Val::Num(a), Val::Num(b)) => Val::Num(a + b),
            (BinOp::Add, Val::Str(_), _) | (BinOp::Add, _, Val::Str(_)) => {
                let text = format!("{}{}", self.to_string(left)?, self.to_string(right)?);
                Val::Str(Rc::from(text))
            }
            (BinOp::Add, Val::Arr(a), Val::Arr(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Val::arr(items)
            }
            (BinOp::Add, Val::Obj(a), Val::Obj(b)) => Val::Obj(self.object(a.extended_by(b))),
            (BinOp::Sub, Val::Num(a), Val::Num(b)) => Val::Num(a - b),
            (BinOp::Mul, Val::Num(a), Val::Num(b)) => Val::Num(a * b),
            (BinOp::Div | BinOp::Mod, Val::Num(_), Val::Num(b)) if *b == 0.0 => {
                return Err(EvalError::runtime("division by zero"));
            }
            (BinOp::Div, Val::Num(a), Val::Num(b)) => Val::Num(a / b),
            (BinOp::Mod, Val::Num(a), Val::Num(b)) => Val::Num(a % b),
            (BinOp::Mod, Val::Str(template), values) => Val::Str(Rc::from(format::format(self, template, values)?)),
            (BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitXor | BinOp::BitOr, Val::Num(a), Val::Num(b)) => {
                Val::Num(bitwise(op, *a as i64, *b as i64)? as f64)
            }
            (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, _, _) => {
                let ordering = self.compare(left, right)?;
                Val::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            (BinOp::In, Val::Str(key), Val::Obj(obj)) => Val::Bool(obj.has_field(key)),
            (BinOp::Eq, _, _) => Val::Bool(self.equals(left, right)?),
            (BinOp::Ne, _, _) => Val::Bool(!self.equals(left, right)?),
            _ => return Err(mismatch()),
        };
        if let Val::Num(n) = result {
            if !n.is_finite() {
                return Err(EvalError::runtime("overflow"));
            }
        }
        Ok(result)
    }

    /// Ordering of numbers, strings, and arrays of those
    pub fn compare(&self, left: &Val, right: &Val) -> Result<Ordering, EvalError> {
        match (left, right) {
            (Val::Num(a), Val::Num(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
            (Val::Str(a), Val::Str(b)) => Ok(a.cmp(b)),
            (Val::Arr(a), Val::Arr(b)) => {
                self.descend(1)?;
                for (x, y) in a.iter().zip(b.iter()) {
                    match self.compare(x, y)? {
                        Ordering::Equal => {}
                        other => return Ok(other),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(EvalError::runtime(format!(
                "cannot compare {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    /// Structural equality over visible fields; functions never compare.
    pub fn equals(&self, left: &Val, right: &Val) -> Result<bool, EvalError> {
        self.equals_at(left, right, 0)
    }

    fn equals_at(&self, left: &Val, right: &Val, depth: usize) -> Result<bool, EvalError> {
        self.descend(depth)?;
        Ok(match (left, right) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Arr(a), Val::Arr(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !self.equals_at(x, y, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Val::Obj(a), Val::Obj(b)) => {
                let names = a.visible_names();
                if names != b.visible_names() {
                    return Ok(false);
                }
                for name in &names {
                    if !self.equals_at(&self.field(a, name)?, &self.field(b, name)?, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Val::Func(_), _) | (_, Val::Func(_)) => {
                return Err(EvalError::runtime("cannot test equality of functions"));
            }
            _ => false,
        })
    }

    // ========== Conversion ==========

    /// Single-line text; strings are returned verbatim
    pub fn to_string(&self, value: &Val) -> Result<String, EvalError> {
        render::to_string(self, value)
    }

    /// Convert to the JSON value model shared with native functions
    pub fn to_json(&self, value: &Val) -> Result<JsonValue, EvalError> {
        self.to_json_at(value, 0)
    }

    fn to_json_at(&self, value: &Val, depth: usize) -> Result<JsonValue, EvalError> {
        self.descend(depth)?;
        Ok(match value {
            Val::Null => JsonValue::Null,
            Val::Bool(b) => JsonValue::Bool(*b),
            Val::Num(n) => number_to_json(*n)?,
            Val::Str(s) => JsonValue::String(s.to_string()),
            Val::Arr(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.to_json_at(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Val::Obj(obj) => {
                self.check_asserts(obj)?;
                let mut map = Map::new();
                for name in obj.visible_names() {
                    let field = self.field(obj, &name)?;
                    map.insert(name, self.to_json_at(&field, depth + 1)?);
                }
                JsonValue::Object(map)
            }
            Val::Func(_) => return Err(EvalError::runtime("couldn't manifest function as JSON")),
        })
    }

    // ========== Function Calls ==========

    pub fn call(&self, target: &Val, positional: Vec<Val>, named: Vec<(String, Val)>) -> Result<Val, EvalError> {
        let func = match target {
            Val::Func(func) => func,
            other => {
                return Err(EvalError::runtime(format!(
                    "unexpected type {}, expected function",
                    other.type_name()
                )))
            }
        };
        match func.as_ref() {
            FuncVal::Closure { params, body, env, file } => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                let bound = bind_args(&names, positional, named)?;
                let scope = env.extend(&self.registry);
                for (param, value) in params.iter().zip(bound) {
                    let thunk = match (value, &param.default) {
                        (Some(value), _) => Thunk::done(value),
                        (None, Some(default)) => Thunk::pending(default.clone(), scope.clone(), file.clone()),
                        (None, None) => {
                            return Err(EvalError::runtime(format!("missing argument: {}", param.name)));
                        }
                    };
                    scope.bind(param.name.clone(), thunk);
                }
                self.framed(|| self.eval(body, &scope, file))
            }
            FuncVal::Builtin(name) => {
                let params = stdlib::params(name);
                let bound = bind_args(params, positional, named)?;
                let required = stdlib::required(name);
                let mut args = Vec::with_capacity(bound.len());
                for (idx, (param, value)) in params.iter().zip(bound).enumerate() {
                    match value {
                        Some(value) => args.push(value),
                        None if idx >= required => args.push(Val::Null),
                        None => return Err(EvalError::runtime(format!("missing argument: {}", param))),
                    }
                }
                stdlib::call(self, name, args)
            }
            FuncVal::Native(native) => {
                let names: Vec<&str> = native.params().iter().map(String::as_str).collect();
                let bound = bind_args(&names, positional, named)?;
                let mut args = Vec::with_capacity(bound.len());
                for (name, value) in names.iter().zip(bound) {
                    match value {
                        Some(value) => args.push(self.to_json(&value)?),
                        None => return Err(EvalError::runtime(format!("missing argument: {}", name))),
                    }
                }
                tracing::trace!(function = native.name(), "calling native function");
                let result = native.call(&args).map_err(|e| EvalError::runtime(e.message))?;
                Ok(Val::from_json(&result))
            }
        }
    }

    // ========== Imports ==========

    fn resolve(&self, from: &str, path: &str) -> Result<Imported, EvalError> {
        let importer = self
            .importer
            .ok_or_else(|| EvalError::runtime(format!("couldn't open import {:?}: no importer configured", path)))?;
        importer
            .import(from, path)
            .map_err(|e| EvalError::runtime(e.to_string()))
    }

    fn import(&self, from: &str, path: &str) -> Result<Val, EvalError> {
        let imported = self.resolve(from, path)?;
        let found_at = imported.found_at;
        let cached = self.imports.borrow().get(&found_at).cloned();
        if let Some(value) = cached {
            return Ok(value);
        }
        if self.importing.borrow().contains(&found_at) {
            let mut chain = self.importing.borrow().clone();
            chain.push(found_at);
            return Err(EvalError::runtime(format!("import cycle: {}", chain.join(" -> "))));
        }
        let source = imported
            .contents
            .to_str()
            .map_err(|e| EvalError::runtime(format!("import {:?} is not valid UTF-8: {}", found_at, e)))?
            .to_string();
        tracing::debug!(path = %found_at, "evaluating import");
        self.importing.borrow_mut().push(found_at.clone());
        let result = self.framed(|| self.eval_source(&found_at, &source));
        self.importing.borrow_mut().pop();
        let value = result?;
        self.imports.borrow_mut().insert(found_at, value.clone());
        Ok(value)
    }

    fn import_str(&self, from: &str, path: &str) -> Result<Rc<str>, EvalError> {
        let imported = self.resolve(from, path)?;
        if let Some(text) = self.import_strs.borrow().get(&imported.found_at) {
            return Ok(text.clone());
        }
        let text: Rc<str> = Rc::from(imported.contents.to_str().map_err(|e| {
            EvalError::runtime(format!("import {:?} is not valid UTF-8: {}", imported.found_at, e))
        })?);
        self.import_strs.borrow_mut().insert(imported.found_at, text.clone());
        Ok(text)
    }
}

/// Match positional and named arguments against parameter names
fn bind_args(
    names: &[&str],
    positional: Vec<Val>,
    named: Vec<(String, Val)>,
) -> Result<Vec<Option<Val>>, EvalError> {
    if positional.len() > names.len() {
        return Err(EvalError::runtime(format!(
            "too many arguments: function has {} parameter(s), got {}",
            names.len(),
            positional.len()
        )));
    }
    let mut bound: Vec<Option<Val>> = vec![None; names.len()];
    for (slot, value) in bound.iter_mut().zip(positional) {
        *slot = Some(value);
    }
    for (name, value) in named {
        let idx = names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| EvalError::runtime(format!("function has no parameter {}", name)))?;
        if bound[idx].is_some() {
            return Err(EvalError::runtime(format!("argument {} already provided", name)));
        }
        bound[idx] = Some(value);
    }
    Ok(bound)
}

fn expect_bool(value: Val, op: &str) -> Result<Val, EvalError> {
    match value {
        Val::Bool(_) => Ok(value),
        other => Err(operand_error(op, &other)),
    }
}

fn operand_error(op: &str, value: &Val) -> EvalError {
    EvalError::runtime(format!("binary operator {} does not operate on type {}", op, value.type_name()))
}

fn array_index(n: f64, len: usize) -> Result<usize, EvalError> {
    if n.fract() != 0.0 {
        return Err(EvalError::runtime(format!("index must be an integer, got {}", n)));
    }
    if n < 0.0 || n >= len as f64 {
        return Err(EvalError::runtime(format!("index {} out of bounds, length {}", n, len)));
    }
    Ok(n as usize)
}

/// Positions selected by `[start:end:step]`; negative bounds count from the end
fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: usize) -> impl Iterator<Item = usize> {
    let len = len as i64;
    let clamp = move |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len, clamp).max(start);
    (start..end).step_by(step).map(|i| i as usize)
}

fn bitwise(op: BinOp, a: i64, b: i64) -> Result<i64, EvalError> {
    Ok(match op {
        BinOp::Shl | BinOp::Shr if b < 0 => {
            return Err(EvalError::runtime(format!("shift by negative exponent {}", b)));
        }
        BinOp::Shl => a.wrapping_shl((b % 64) as u32),
        BinOp::Shr => a.wrapping_shr((b % 64) as u32),
        BinOp::BitAnd => a & b,
        BinOp::BitXor => a ^ b,
        _ => a | b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_interpreter<T>(work: impl FnOnce(&Interpreter<'_>) -> T) -> T {
        let natives = HashMap::new();
        let interp = Interpreter::new(None, &natives);
        work(&interp)
    }

    fn eval(interp: &Interpreter<'_>, source: &str) -> Result<Val, EvalError> {
        interp.eval_source("test.jsonnet", source)
    }

    #[test]
    fn test_fields_are_evaluated_on_access() {
        with_interpreter(|interp| {
            let obj = eval(interp, "{ ok: 1, bad: error 'not read' }").unwrap();
            assert!(matches!(interp.index(&obj, &Val::str("ok")), Ok(Val::Num(n)) if n == 1.0));
            let err = interp.index(&obj, &Val::str("bad")).unwrap_err();
            assert_eq!(err.message, "not read");
        });
    }

    #[test]
    fn test_frame_counters_reset_after_error() {
        with_interpreter(|interp| {
            let err = eval(interp, "local f(n) = if n == 0 then error 'bottom' else f(n - 1); f(20)").unwrap_err();
            assert_eq!(err.message, "bottom");
            assert_eq!(interp.stack.get(), 0);
            assert_eq!(interp.depth.get(), 0);
        });
    }

    #[test]
    fn test_function_equality_is_error() {
        with_interpreter(|interp| {
            let f = Val::Func(Rc::new(FuncVal::Builtin("length")));
            assert!(interp.equals(&f, &Val::Null).is_err());
        });
    }

    #[test]
    fn test_object_equality_ignores_hidden_fields() {
        with_interpreter(|interp| {
            let left = eval(interp, "{ a: 1, h:: 2 }").unwrap();
            let right = eval(interp, "{ a: 1 }").unwrap();
            assert!(interp.equals(&left, &right).unwrap());
        });
    }

    #[test]
    fn test_slice_indices() {
        assert_eq!(slice_indices(5, Some(1), Some(4), 2).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(slice_indices(5, Some(-2), None, 1).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(slice_indices(3, Some(2), Some(1), 1).count(), 0);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(bitwise(BinOp::Shl, 1, 4).unwrap(), 16);
        assert_eq!(bitwise(BinOp::BitXor, 6, 3).unwrap(), 5);
        assert!(bitwise(BinOp::Shr, 1, -1).is_err());
    }
}
