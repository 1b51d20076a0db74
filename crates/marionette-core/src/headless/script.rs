use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::mainloop::MainLoop;
use crate::script::{
    CancelHandle, EvalCallback, EvalResult, MessageHandler, ScriptEngine, ScriptError,
};
use crate::value::{ForeignObject, ForeignObjectImpl, ForeignValue};

const OBSERVE_CALL: &str = "__observe__(";

/// Mutable object living on the headless page.
#[derive(Debug, Default)]
pub struct PageObject {
    properties: RefCell<IndexMap<SmolStr, ForeignValue>>,
}

impl PageObject {
    pub fn new<'a>(properties: impl IntoIterator<Item = (&'a str, ForeignValue)>) -> Rc<Self> {
        Rc::new(Self {
            properties: RefCell::new(
                properties
                    .into_iter()
                    .map(|(name, value)| (SmolStr::new(name), value))
                    .collect(),
            ),
        })
    }

    /// Store a value, returning whether it changed.
    pub fn set(&self, name: &str, value: ForeignValue) -> bool {
        let mut properties = self.properties.borrow_mut();
        if properties.get(name) == Some(&value) {
            return false;
        }
        properties.insert(SmolStr::new(name), value);
        true
    }
}

impl ForeignObjectImpl for PageObject {
    fn get_property(&self, name: &str) -> ForeignValue {
        self.properties
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(ForeignValue::Undefined)
    }

    fn property_names(&self) -> Vec<SmolStr> {
        self.properties.borrow().keys().cloned().collect()
    }
}

#[derive(Debug)]
enum Global {
    Value(ForeignValue),
    Object(Rc<PageObject>),
}

impl Global {
    fn value(&self) -> ForeignValue {
        match self {
            Self::Value(value) => value.clone(),
            Self::Object(object) => ForeignValue::Object(ForeignObject::from(Rc::clone(object))),
        }
    }
}

/// Script engine understanding the statements the bridge emits:
/// `ident`, `ident.prop=literal;` and the observe call.
///
/// Evaluations complete asynchronously on the main loop. Observed objects
/// post `{object, property, value}` to the registered message handler when
/// a property changes, like the page-side observe glue does.
pub struct HeadlessScriptEngine {
    this: Weak<HeadlessScriptEngine>,
    main_loop: MainLoop,
    globals: RefCell<IndexMap<SmolStr, Global>>,
    handlers: RefCell<FxHashMap<SmolStr, MessageHandler>>,
    observed: RefCell<FxHashMap<SmolStr, SmolStr>>,
    executed: RefCell<Vec<String>>,
    shut_down: Cell<bool>,
}

impl HeadlessScriptEngine {
    #[must_use]
    pub fn new(main_loop: MainLoop) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            main_loop,
            globals: RefCell::new(IndexMap::new()),
            handlers: RefCell::new(FxHashMap::default()),
            observed: RefCell::new(FxHashMap::default()),
            executed: RefCell::new(Vec::new()),
            shut_down: Cell::new(false),
        })
    }

    pub fn define_value(&self, name: &str, value: ForeignValue) {
        self.globals
            .borrow_mut()
            .insert(SmolStr::new(name), Global::Value(value));
    }

    pub fn define_object<'a>(
        &self,
        name: &str,
        properties: impl IntoIterator<Item = (&'a str, ForeignValue)>,
    ) -> Rc<PageObject> {
        let object = PageObject::new(properties);
        self.globals
            .borrow_mut()
            .insert(SmolStr::new(name), Global::Object(Rc::clone(&object)));
        object
    }

    /// Change a property from the page side, notifying if observed.
    pub fn set_page_property(&self, variable: &str, property: &str, value: ForeignValue) -> bool {
        let Some(object) = self.page_object(variable) else {
            return false;
        };
        if object.set(property, value.clone()) {
            self.post_change(variable, property, value);
        }
        true
    }

    /// Property value as the page sees it.
    #[must_use]
    pub fn page_property(&self, variable: &str, property: &str) -> ForeignValue {
        self.page_object(variable)
            .map_or(ForeignValue::Undefined, |object| object.get_property(property))
    }

    /// Property assignments executed so far, in execution order.
    #[must_use]
    pub fn executed_assignments(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    #[must_use]
    pub fn is_observed(&self, variable: &str) -> bool {
        self.observed.borrow().contains_key(variable)
    }

    #[must_use]
    pub fn handler_names(&self) -> Vec<SmolStr> {
        let mut names: Vec<SmolStr> = self.handlers.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Post `message` to the handler registered as `handler`, the way a page
    /// script would. Delivery happens on the main loop.
    pub fn post_message(&self, handler: &str, message: ForeignValue) {
        let this = self.this.clone();
        let handler_name = SmolStr::new(handler);
        self.main_loop.invoke(move || {
            let Some(engine) = this.upgrade() else {
                return;
            };
            let handler = engine.handlers.borrow().get(&handler_name).cloned();
            match handler {
                Some(handler) => handler(message),
                None => debug!(handler = %handler_name, "no message handler registered"),
            }
        });
    }

    /// Tear the page down. Queued evaluations complete as cancelled.
    pub fn shutdown(&self) {
        self.shut_down.set(true);
        self.handlers.borrow_mut().clear();
    }

    fn page_object(&self, variable: &str) -> Option<Rc<PageObject>> {
        match self.globals.borrow().get(variable) {
            Some(Global::Object(object)) => Some(Rc::clone(object)),
            _ => None,
        }
    }

    fn post_change(&self, variable: &str, property: &str, value: ForeignValue) {
        let Some(handler_name) = self.observed.borrow().get(variable).cloned() else {
            return;
        };
        let message = PageObject::new([
            ("object", ForeignValue::String(SmolStr::new(variable))),
            ("property", ForeignValue::String(SmolStr::new(property))),
            ("value", value),
        ]);
        self.post_message(&handler_name, ForeignValue::Object(ForeignObject::from(message)));
    }

    fn execute(&self, script: &str) -> EvalResult {
        let statement = script.trim().trim_end_matches(';').trim();
        if let Some(args) = statement
            .strip_prefix(OBSERVE_CALL)
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return self.observe(args);
        }
        if let Some((target, literal)) = statement.split_once('=') {
            return self.assign(script, target.trim(), literal.trim());
        }
        if is_identifier(statement) {
            return self
                .globals
                .borrow()
                .get(statement)
                .map(Global::value)
                .ok_or_else(|| reference_error(statement));
        }
        Err(ScriptError::Failed(SmolStr::new(format!(
            "SyntaxError: unsupported statement '{statement}'"
        ))))
    }

    fn observe(&self, args: &str) -> EvalResult {
        let (variable, handler) = args
            .split_once(',')
            .map(|(variable, handler)| {
                (
                    variable.trim(),
                    handler.trim().trim_matches(|c: char| c == '\'' || c == '"'),
                )
            })
            .ok_or_else(|| ScriptError::Failed(SmolStr::new("observe needs two arguments")))?;
        let value = self
            .globals
            .borrow()
            .get(variable)
            .map(Global::value)
            .ok_or_else(|| reference_error(variable))?;
        if value.as_object().is_some() {
            self.observed
                .borrow_mut()
                .insert(SmolStr::new(variable), SmolStr::new(handler));
        }
        Ok(value)
    }

    fn assign(&self, script: &str, target: &str, literal: &str) -> EvalResult {
        let Some((variable, property)) = target.split_once('.') else {
            return Err(ScriptError::Failed(SmolStr::new(format!(
                "SyntaxError: invalid assignment target '{target}'"
            ))));
        };
        let Some(object) = self.page_object(variable) else {
            return Err(reference_error(variable));
        };
        let value = parse_literal(literal).ok_or_else(|| {
            ScriptError::Failed(SmolStr::new(format!("SyntaxError: bad literal '{literal}'")))
        })?;
        self.executed.borrow_mut().push(script.trim().to_owned());
        if object.set(property, value.clone()) {
            self.post_change(variable, property, value.clone());
        }
        Ok(value)
    }
}

impl ScriptEngine for HeadlessScriptEngine {
    fn evaluate(&self, script: &str, cancel: Option<CancelHandle>, done: EvalCallback) {
        let this = self.this.clone();
        let script = script.to_owned();
        self.main_loop.invoke(move || {
            let Some(engine) = this.upgrade() else {
                done(Err(ScriptError::Cancelled));
                return;
            };
            if engine.shut_down.get() || cancel.as_ref().is_some_and(CancelHandle::is_cancelled)
            {
                debug!(%script, "skipping cancelled script");
                done(Err(ScriptError::Cancelled));
                return;
            }
            let result = engine.execute(&script);
            if let Err(err) = &result {
                warn!(%script, %err, "script failed");
            }
            done(result);
        });
    }

    fn register_message_handler(&self, name: &str, handler: MessageHandler) -> bool {
        if self.shut_down.get() {
            return false;
        }
        self.handlers
            .borrow_mut()
            .insert(SmolStr::new(name), handler);
        true
    }

    fn observe_script(&self, variable: &str, handler: &str) -> String {
        format!("{OBSERVE_CALL}{variable}, '{handler}')")
    }
}

fn reference_error(name: &str) -> ScriptError {
    ScriptError::Failed(SmolStr::new(format!(
        "ReferenceError: Can't find variable: {name}"
    )))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn parse_literal(text: &str) -> Option<ForeignValue> {
    let value = match text {
        "true" => ForeignValue::Bool(true),
        "false" => ForeignValue::Bool(false),
        "null" => ForeignValue::Null,
        "undefined" => ForeignValue::Undefined,
        "NaN" => ForeignValue::Number(f64::NAN),
        "Infinity" => ForeignValue::Number(f64::INFINITY),
        "-Infinity" => ForeignValue::Number(f64::NEG_INFINITY),
        _ if text.starts_with('"') => {
            ForeignValue::String(SmolStr::new(serde_json::from_str::<String>(text).ok()?))
        }
        _ => ForeignValue::Number(text.parse().ok()?),
    };
    Some(value)
}
