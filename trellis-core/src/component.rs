//! Components
//!
//! # How It Works
//!
//! A [`ComponentDef`] is the immutable recipe: declared props, an
//! optional `setup` function, an optional `data` function, and a render
//! function. A [`ComponentInstance`] is one mounted occurrence of a
//! recipe: reactive props, fall-through attrs, slots, reactive state,
//! lifecycle hooks, and the render effect the renderer binds to it.
//!
//! Raw vnode props are split on mount: keys the definition declares
//! become reactive (readonly to user code) props; everything else is a
//! plain attr. Render functions resolve names through the instance in
//! setup-state, then data-state, then props order, with ref bindings
//! unwrapped transparently.
//!
//! Stateful components run `setup` once with the instance as the ambient
//! current instance, so lifecycle registration and provide/inject work
//! without passing the instance around. Functional components are just a
//! render function; they get props and slots but no state or hooks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::error::Error;
use crate::lifecycle::{HookFn, InstanceGuard, LifecyclePhase};
use crate::provide::Scope;
use crate::reactive::{Effect, ProxyRefs, Store};
use crate::value::Value;
use crate::vnode::{normalize_vnode, Children, Rendered, VNode};

/// Produces the vnodes for one named slot; the argument carries
/// slot props from the rendering parent.
pub type SlotFn = Arc<dyn Fn(Value) -> Vec<VNode> + Send + Sync>;
pub type Slots = IndexMap<String, SlotFn>;

pub type RenderFn = Arc<dyn Fn(&ComponentInstance) -> Rendered + Send + Sync>;
pub type SetupFn =
    Arc<dyn Fn(&SetupContext) -> Result<SetupResult, Error> + Send + Sync>;
pub type DataFn = Arc<dyn Fn() -> Value + Send + Sync>;
pub type LoaderFn = Arc<dyn Fn() -> Result<Arc<ComponentDef>, Error> + Send + Sync>;

static INSTANCE_UID: AtomicU64 = AtomicU64::new(1);

/// Names that would collide with structural vnode kinds.
const RESERVED_NAMES: &[&str] = &["slot", "component", "template", "fragment", "teleport"];

fn validate_name(name: &str) {
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '-');
    if !well_formed {
        warn!(name, "component name should contain only letters and dashes");
    }
    if RESERVED_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        warn!(name, "component name shadows a built-in");
    }
}

/// What `setup` may hand back: a map of bindings (refs unwrap on
/// access), or a render function replacing the definition's.
pub enum SetupResult {
    Bindings(Value),
    Render(RenderFn),
}

impl SetupResult {
    pub fn render<F>(f: F) -> SetupResult
    where
        F: Fn(&ComponentInstance) -> Rendered + Send + Sync + 'static,
    {
        SetupResult::Render(Arc::new(f))
    }
}

/// Immutable component recipe. Build one with [`ComponentDef::new`] and
/// share it as an `Arc`; vnode same-type identity is `Arc` identity.
pub struct ComponentDef {
    name: String,
    declared_props: Vec<String>,
    setup: Option<SetupFn>,
    data: Option<DataFn>,
    render: Option<RenderFn>,
    functional: bool,
    loader: Option<LoaderFn>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> ComponentDefBuilder {
        let name = name.into();
        validate_name(&name);
        ComponentDefBuilder {
            def: ComponentDef {
                name,
                declared_props: Vec::new(),
                setup: None,
                data: None,
                render: None,
                functional: false,
                loader: None,
            },
        }
    }

    /// A functional component: a bare render function over props and
    /// slots. No state, no lifecycle hooks.
    pub fn functional<F>(name: impl Into<String>, render: F) -> Arc<ComponentDef>
    where
        F: Fn(&ComponentInstance) -> Rendered + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name);
        Arc::new(ComponentDef {
            name,
            declared_props: Vec::new(),
            setup: None,
            data: None,
            render: Some(Arc::new(render)),
            functional: true,
            loader: None,
        })
    }

    /// A component resolved by a loader at first mount. A failing load
    /// is contained: the occurrence renders as a placeholder.
    pub fn lazy<F>(name: impl Into<String>, loader: F) -> Arc<ComponentDef>
    where
        F: Fn() -> Result<Arc<ComponentDef>, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        validate_name(&name);
        Arc::new(ComponentDef {
            name,
            declared_props: Vec::new(),
            setup: None,
            data: None,
            render: None,
            functional: false,
            loader: Some(Arc::new(loader)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub(crate) fn loader(&self) -> Option<&LoaderFn> {
        self.loader.as_ref()
    }

    pub(crate) fn declares_prop(&self, key: &str) -> bool {
        self.declared_props.iter().any(|p| p == key)
    }

    /// Whether `key` should land in props rather than attrs. Functional
    /// components without a props list take everything as props.
    pub(crate) fn accepts_prop(&self, key: &str) -> bool {
        if self.functional && self.declared_props.is_empty() {
            return true;
        }
        self.declares_prop(key)
    }
}

pub struct ComponentDefBuilder {
    def: ComponentDef,
}

impl ComponentDefBuilder {
    /// Declare the prop keys this component consumes. Undeclared vnode
    /// props fall through as attrs.
    pub fn props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.declared_props = props.into_iter().map(Into::into).collect();
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&SetupContext) -> Result<SetupResult, Error> + Send + Sync + 'static,
    {
        self.def.setup = Some(Arc::new(setup));
        self
    }

    /// Instance state factory. Must return a map; anything else warns
    /// and is ignored.
    pub fn data<F>(mut self, data: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.def.data = Some(Arc::new(data));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&ComponentInstance) -> Rendered + Send + Sync + 'static,
    {
        self.def.render = Some(Arc::new(render));
        self
    }

    pub fn build(self) -> Arc<ComponentDef> {
        Arc::new(self.def)
    }
}

/// Access to the instance from inside `setup`.
pub struct SetupContext<'a> {
    instance: &'a Arc<ComponentInstance>,
}

impl SetupContext<'_> {
    /// Declared props, readonly.
    pub fn props(&self) -> Store {
        self.instance.props()
    }

    pub fn attrs(&self) -> IndexMap<String, Value> {
        self.instance.attrs()
    }

    pub fn slots(&self) -> Slots {
        self.instance.slots()
    }

    pub fn instance(&self) -> &Arc<ComponentInstance> {
        self.instance
    }
}

/// One mounted occurrence of a component.
pub struct ComponentInstance {
    uid: u64,
    def: Arc<ComponentDef>,
    parent: Weak<ComponentInstance>,
    /// Declared props, reactive. Written only by the update path.
    props: Store,
    attrs: Mutex<IndexMap<String, Value>>,
    slots: Mutex<Slots>,
    /// State from the `data` option.
    state: Store,
    /// Bindings returned by `setup`, ref-unwrapping.
    setup_state: Mutex<Option<ProxyRefs>>,
    /// Render function returned by `setup`, if any.
    setup_render: Mutex<Option<RenderFn>>,
    scope: Mutex<Arc<Scope>>,
    owns_scope: AtomicBool,
    hooks: Mutex<IndexMap<LifecyclePhase, Vec<HookFn>>>,
    mounted: AtomicBool,
    /// Last rendered subtree, diffed against on update.
    sub_tree: Mutex<Option<VNode>>,
    /// Pending component vnode for a parent-driven update.
    next: Mutex<Option<VNode>>,
    /// Render effect, bound by the renderer.
    update: Mutex<Option<Effect>>,
}

impl ComponentInstance {
    pub(crate) fn new(
        def: Arc<ComponentDef>,
        parent: Option<&Arc<ComponentInstance>>,
    ) -> Arc<ComponentInstance> {
        let scope = match parent {
            // Share the parent's scope until this instance provides.
            Some(p) => p.scope.lock().clone(),
            None => Arc::new(Scope::root()),
        };
        Arc::new(ComponentInstance {
            uid: INSTANCE_UID.fetch_add(1, Ordering::Relaxed),
            def,
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            props: Store::new(),
            attrs: Mutex::new(IndexMap::new()),
            slots: Mutex::new(IndexMap::new()),
            state: Store::new(),
            setup_state: Mutex::new(None),
            setup_render: Mutex::new(None),
            scope: Mutex::new(scope),
            owns_scope: AtomicBool::new(false),
            hooks: Mutex::new(IndexMap::new()),
            mounted: AtomicBool::new(false),
            sub_tree: Mutex::new(None),
            next: Mutex::new(None),
            update: Mutex::new(None),
        })
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn def(&self) -> &Arc<ComponentDef> {
        &self.def
    }

    pub fn parent(&self) -> Option<Arc<ComponentInstance>> {
        self.parent.upgrade()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub(crate) fn set_mounted(&self) {
        self.mounted.store(true, Ordering::Release);
    }

    /// Readonly view of the declared props.
    pub fn props(&self) -> Store {
        self.props.readonly()
    }

    pub fn attrs(&self) -> IndexMap<String, Value> {
        self.attrs.lock().clone()
    }

    pub fn slots(&self) -> Slots {
        self.slots.lock().clone()
    }

    pub fn slot(&self, name: &str) -> Option<SlotFn> {
        self.slots.lock().get(name).cloned()
    }

    /// Instance state from the `data` option applied at init.
    pub fn state(&self) -> Store {
        self.state.clone()
    }

    // ---- init ------------------------------------------------------

    /// Split raw vnode props into declared props and fall-through attrs.
    pub(crate) fn init_props(&self, raw: &IndexMap<String, Value>) {
        let mut attrs = self.attrs.lock();
        for (key, value) in raw {
            if self.def.accepts_prop(key) {
                self.props.set(key, value.clone());
            } else {
                attrs.insert(key.clone(), value.clone());
            }
        }
    }

    pub(crate) fn init_slots(&self, children: &Children) {
        let mut slots = self.slots.lock();
        match children {
            Children::Slots(named) => {
                *slots = named.clone();
            }
            Children::Nodes(nodes) => {
                // Bare node children become the default slot.
                let nodes = nodes.clone();
                slots.insert(
                    "default".to_owned(),
                    Arc::new(move |_| nodes.clone()) as SlotFn,
                );
            }
            _ => {}
        }
    }

    /// Run `data` and `setup`. Must be called exactly once, before the
    /// first render, with `self` as the soon-to-be current instance.
    pub(crate) fn init_state(self: &Arc<Self>) {
        if let Some(data) = &self.def.data {
            match data() {
                Value::Map(node) => {
                    let source = Value::Map(node);
                    if let Some(store) = Store::from_value(&source) {
                        for key in store.keys() {
                            self.state.set(&key, store.get_untracked(&key));
                        }
                    }
                }
                other => {
                    warn!(
                        component = self.def.name(),
                        got = %other,
                        "data option must return a map; ignored"
                    );
                }
            }
        }

        if self.def.functional {
            return;
        }
        let Some(setup) = self.def.setup.clone() else {
            return;
        };

        let _guard = InstanceGuard::enter(self.clone());
        let ctx = SetupContext { instance: self };
        match setup(&ctx) {
            Ok(SetupResult::Bindings(value)) => match Store::from_value(&value) {
                Some(store) => {
                    *self.setup_state.lock() = Some(ProxyRefs::new(store));
                }
                None => {
                    warn!(
                        component = self.def.name(),
                        "setup bindings must be a map; ignored"
                    );
                }
            },
            Ok(SetupResult::Render(render)) => {
                *self.setup_render.lock() = Some(render);
            }
            Err(err) => {
                // Contained: the component renders from whatever state
                // exists, rather than poisoning the tree.
                error!(component = self.def.name(), error = %err, "setup failed");
            }
        }
    }

    // ---- name resolution -------------------------------------------

    /// Tracked name lookup: setup bindings, then data state, then props.
    pub fn get(&self, key: &str) -> Value {
        if let Some(setup_state) = &*self.setup_state.lock() {
            if setup_state.store().contains(key) {
                return setup_state.get(key);
            }
        }
        if self.state.contains(key) {
            return self.state.get(key);
        }
        self.props.get(key)
    }

    /// Write a name, routed the same way reads resolve. Writes that
    /// land on a prop warn and are dropped.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(setup_state) = &*self.setup_state.lock() {
            if setup_state.store().contains(key) {
                setup_state.set(key, value);
                return;
            }
        }
        if self.state.contains(key) {
            self.state.set(key, value);
            return;
        }
        if self.def.declares_prop(key) {
            warn!(
                component = self.def.name(),
                key, "props are readonly; write ignored"
            );
            return;
        }
        self.state.set(key, value);
    }

    // ---- rendering --------------------------------------------------

    /// Produce the instance's subtree. Runs with this instance current,
    /// so slot and hook registration inside render resolves here.
    pub(crate) fn render(self: &Arc<Self>) -> VNode {
        let render = self
            .setup_render
            .lock()
            .clone()
            .or_else(|| self.def.render.clone());
        match render {
            Some(render) => {
                let _guard = InstanceGuard::enter(self.clone());
                normalize_vnode(render(self))
            }
            None => {
                warn!(component = self.def.name(), "component has no render function");
                normalize_vnode(Rendered::Nothing)
            }
        }
    }

    // ---- updates ----------------------------------------------------

    /// Overwrite changed props, then drop the ones the new vnode no
    /// longer passes.
    pub(crate) fn update_props(&self, raw: &IndexMap<String, Value>) {
        let mut attrs = self.attrs.lock();
        for (key, value) in raw {
            if self.def.accepts_prop(key) {
                self.props.set(key, value.clone());
            } else {
                attrs.insert(key.clone(), value.clone());
            }
        }
        for stale in self
            .props
            .keys()
            .into_iter()
            .filter(|k| !raw.contains_key(k.as_str()))
        {
            self.props.remove(&stale);
        }
        attrs.retain(|key, _| raw.contains_key(key));
    }

    pub(crate) fn sub_tree(&self) -> Option<VNode> {
        self.sub_tree.lock().clone()
    }

    pub(crate) fn set_sub_tree(&self, tree: VNode) {
        *self.sub_tree.lock() = Some(tree);
    }

    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.next.lock().take()
    }

    pub(crate) fn set_next(&self, vnode: VNode) {
        *self.next.lock() = Some(vnode);
    }

    pub(crate) fn bind_update(&self, effect: Effect) {
        *self.update.lock() = Some(effect);
    }

    pub(crate) fn update_effect(&self) -> Option<Effect> {
        self.update.lock().clone()
    }

    // ---- lifecycle hooks -------------------------------------------

    pub(crate) fn register_hook(&self, phase: LifecyclePhase, hook: HookFn) {
        self.hooks.lock().entry(phase).or_default().push(hook);
    }

    /// Run hooks of one phase, each with this instance current.
    pub(crate) fn invoke_hooks(self: &Arc<Self>, phase: LifecyclePhase) {
        let hooks = self
            .hooks
            .lock()
            .get(&phase)
            .cloned()
            .unwrap_or_default();
        if hooks.is_empty() {
            return;
        }
        let _guard = InstanceGuard::enter(self.clone());
        for hook in hooks {
            hook();
        }
    }

    // ---- provide / inject ------------------------------------------

    /// First provide clones this instance its own scope; until then the
    /// parent's scope is shared by reference.
    pub fn provide(&self, key: &str, value: impl Into<Value>) {
        if !self.owns_scope.swap(true, Ordering::AcqRel) {
            let mut scope = self.scope.lock();
            *scope = Arc::new(Scope::child_of(scope.clone()));
        }
        self.scope.lock().provide(key, value.into());
    }

    /// Walk the scope chain; fall back to `default` when absent.
    pub fn inject(&self, key: &str, default: Option<Value>) -> Value {
        match self.scope.lock().lookup(key) {
            Some(value) => value,
            None => default.unwrap_or(Value::Null),
        }
    }
}

impl std::fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid)
            .field("component", &self.def.name())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Parent-driven update check: re-render when the new vnode carries
/// slots or any prop value changed.
pub(crate) fn should_update_component(old: &VNode, new: &VNode) -> bool {
    if matches!(new.children, Children::Slots(_)) || matches!(new.children, Children::Nodes(_)) {
        return true;
    }
    if old.props.len() != new.props.len() {
        return true;
    }
    new.props
        .iter()
        .any(|(key, value)| old.props.get(key) != Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::props;

    fn plain_def() -> Arc<ComponentDef> {
        ComponentDef::new("plain")
            .props(["title"])
            .render(|i| Rendered::Text(i.get("title").to_string()))
            .build()
    }

    #[test]
    fn props_split_from_attrs() {
        let def = plain_def();
        let instance = ComponentInstance::new(def, None);
        instance.init_props(&props([
            ("title", Value::str("hello")),
            ("class", Value::str("wide")),
        ]));

        assert_eq!(instance.get("title"), Value::str("hello"));
        assert_eq!(
            instance.attrs().get("class"),
            Some(&Value::str("wide"))
        );
        assert!(!instance.props().contains("class"));
    }

    #[test]
    fn data_state_is_reactive_and_writable() {
        let def = ComponentDef::new("counter")
            .data(|| Value::map([("count", Value::from(0i64))]))
            .render(|i| Rendered::Text(i.get("count").to_string()))
            .build();
        let instance = ComponentInstance::new(def, None);
        instance.init_state();

        assert_eq!(instance.get("count"), Value::from(0i64));
        instance.set("count", 1i64);
        assert_eq!(instance.get("count"), Value::from(1i64));
    }

    #[test]
    fn non_map_data_warns_and_is_ignored() {
        let def = ComponentDef::new("broken")
            .data(|| Value::from(42i64))
            .render(|_| Rendered::Nothing)
            .build();
        let instance = ComponentInstance::new(def, None);
        instance.init_state();
        assert!(instance.state().is_empty());
    }

    #[test]
    fn setup_bindings_unwrap_refs() {
        use crate::reactive::ValueRef;

        let def = ComponentDef::new("with-setup")
            .setup(|_| {
                Ok(SetupResult::Bindings(Value::map([(
                    "count",
                    Value::from(ValueRef::new(5i64)),
                )])))
            })
            .render(|i| Rendered::Text(i.get("count").to_string()))
            .build();
        let instance = ComponentInstance::new(def, None);
        instance.init_state();

        assert_eq!(instance.get("count"), Value::from(5i64));
        instance.set("count", 6i64);
        assert_eq!(instance.get("count"), Value::from(6i64));
    }

    #[test]
    fn setup_failure_is_contained() {
        let def = ComponentDef::new("failing")
            .setup(|_| {
                Err(Error::Setup {
                    component: "failing".to_owned(),
                    message: "boom".to_owned(),
                })
            })
            .render(|_| Rendered::Text("still renders".to_owned()))
            .build();
        let instance = ComponentInstance::new(def, None);
        instance.init_state();

        let tree = instance.render();
        assert_eq!(tree.text_content(), "still renders");
    }

    #[test]
    fn prop_writes_are_refused() {
        let def = plain_def();
        let instance = ComponentInstance::new(def, None);
        instance.init_props(&props([("title", Value::str("a"))]));

        instance.set("title", Value::str("b"));
        assert_eq!(instance.get("title"), Value::str("a"));
    }

    #[test]
    fn update_props_overwrites_and_prunes() {
        let def = ComponentDef::new("listy")
            .props(["a", "b"])
            .render(|_| Rendered::Nothing)
            .build();
        let instance = ComponentInstance::new(def, None);
        instance.init_props(&props([
            ("a", Value::from(1i64)),
            ("b", Value::from(2i64)),
        ]));

        instance.update_props(&props([("a", Value::from(3i64))]));
        assert_eq!(instance.get("a"), Value::from(3i64));
        assert_eq!(instance.get("b"), Value::Null);
        assert!(!instance.props().contains("b"));
    }

    #[test]
    fn should_update_component_compares_props() {
        let def = plain_def();
        let old = VNode::component(def.clone(), props([("title", Value::str("x"))]));
        let same = VNode::component(def.clone(), props([("title", Value::str("x"))]));
        let changed = VNode::component(def, props([("title", Value::str("y"))]));

        assert!(!should_update_component(&old, &same));
        assert!(should_update_component(&old, &changed));
    }

    #[test]
    fn node_children_become_default_slot() {
        let def = plain_def();
        let instance = ComponentInstance::new(def, None);
        instance.init_slots(&Children::Nodes(vec![VNode::text("slotted")]));

        let slot = instance.slot("default").unwrap();
        let produced = slot(Value::Null);
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].text_content(), "slotted");
    }

    #[test]
    fn provide_inject_walks_parents() {
        let def = plain_def();
        let parent = ComponentInstance::new(def.clone(), None);
        parent.provide("theme", Value::str("dark"));

        let child = ComponentInstance::new(def.clone(), Some(&parent));
        let grandchild = ComponentInstance::new(def, Some(&child));

        assert_eq!(grandchild.inject("theme", None), Value::str("dark"));
        assert_eq!(
            grandchild.inject("missing", Some(Value::str("fallback"))),
            Value::str("fallback")
        );

        // A child's own provide shadows without touching the parent.
        child.provide("theme", Value::str("light"));
        assert_eq!(grandchild.inject("theme", None), Value::str("dark"));
        let fresh = ComponentInstance::new(
            ComponentDef::new("leaf").render(|_| Rendered::Nothing).build(),
            Some(&child),
        );
        assert_eq!(fresh.inject("theme", None), Value::str("light"));
    }
}
