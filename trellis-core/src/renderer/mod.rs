//! Renderer
//!
//! # How It Works
//!
//! The renderer turns vnode trees into host-tree mutations through the
//! [`HostOps`] seam. `render(Some(tree), container)` diffs against the
//! tree previously rendered into that container; `render(None, ...)`
//! unmounts. Each render call is one tick: queued component updates and
//! post-flush lifecycle callbacks are flushed before it returns, and
//! reactive writes made outside a render call take effect on the next
//! [`flush_jobs`].
//!
//! Patching is type-directed. Two vnodes of the same kind and key are
//! patched in place (host node reused, props and children reconciled);
//! anything else is a replace. Keyed children go through the full diff:
//! matching prefix and suffix are patched first, a pure insertion or
//! removal remainder is handled directly, and the remaining middle
//! window is reconciled through a key map plus a longest increasing
//! subsequence so only nodes genuinely out of order are moved.
//!
//! Components mount by binding a render effect: the effect renders the
//! subtree and patches it against the previous one, and its scheduler
//! enqueues the instance's update job, so many synchronous writes
//! collapse into one re-render per flush.

mod sequence;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::component::{should_update_component, ComponentInstance};
use crate::host::{HostOps, NodeHandle};
use crate::lifecycle::LifecyclePhase;
use crate::reactive::Effect;
use crate::scheduler::{flush_jobs, queue_job, queue_post_flush, Job};
use crate::value::Value;
use crate::vnode::{is_same_vnode_type, Children, Key, ShapeFlags, VNode, VNodeKind};

use sequence::longest_increasing_subsequence;

fn child_nodes(vnode: &VNode) -> &[VNode] {
    match &vnode.children {
        Children::Nodes(nodes) => nodes,
        _ => &[],
    }
}

#[derive(Clone)]
pub struct Renderer {
    host: Arc<dyn HostOps>,
    /// Previously rendered tree per container.
    roots: Arc<Mutex<HashMap<u64, VNode>>>,
}

impl Renderer {
    pub fn new(host: Arc<dyn HostOps>) -> Self {
        Self {
            host,
            roots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Render `vnode` into `container`, diffing against whatever was
    /// rendered there before. `None` unmounts the container's tree.
    pub fn render(&self, vnode: Option<VNode>, container: NodeHandle) {
        let key = container.as_raw();
        let prev = self.roots.lock().get(&key).cloned();
        match vnode {
            Some(next) => {
                debug!(container = key, first = prev.is_none(), "render");
                self.patch(prev.as_ref(), &next, container, None, None);
                self.roots.lock().insert(key, next);
            }
            None => {
                debug!(container = key, "unmount render root");
                if let Some(prev) = &prev {
                    self.unmount(prev);
                }
                self.roots.lock().remove(&key);
            }
        }
        // One render call is one tick.
        flush_jobs();
    }

    fn patch(
        &self,
        mut n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        if let Some(old) = n1 {
            if !is_same_vnode_type(old, n2) {
                self.unmount(old);
                n1 = None;
            }
        }

        match &n2.kind {
            VNodeKind::Text => self.process_text(n1, n2, container, anchor),
            VNodeKind::Comment => self.process_comment(n1, n2, container, anchor),
            VNodeKind::Fragment => self.process_fragment(n1, n2, container, anchor, parent),
            VNodeKind::Element(_) => self.process_element(n1, n2, container, anchor, parent),
            VNodeKind::Component(_) => self.process_component(n1, n2, container, anchor, parent),
            VNodeKind::Teleport { target } => {
                let target = target.clone();
                self.process_teleport(n1, n2, &target, parent)
            }
        }
    }

    // ---- text / comment --------------------------------------------

    fn process_text(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        match n1 {
            None => {
                let el = self.host.create_text(n2.text_content());
                n2.set_el(el);
                self.host.insert(el, container, anchor);
            }
            Some(old) => {
                n2.inherit_mount(old);
                if old.text_content() != n2.text_content() {
                    if let Some(el) = n2.el() {
                        self.host.set_text(el, n2.text_content());
                    }
                }
            }
        }
    }

    fn process_comment(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        match n1 {
            None => {
                let el = self.host.create_comment("");
                n2.set_el(el);
                self.host.insert(el, container, anchor);
            }
            Some(old) => n2.inherit_mount(old),
        }
    }

    // ---- elements ---------------------------------------------------

    fn process_element(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => self.mount_element(n2, container, anchor, parent),
            Some(old) => self.patch_element(old, n2, parent),
        }
    }

    fn mount_element(
        &self,
        vnode: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let VNodeKind::Element(tag) = &vnode.kind else {
            return;
        };
        let el = self.host.create_element(tag);
        vnode.set_el(el);

        for (key, value) in &vnode.props {
            self.host.patch_prop(el, key, None, Some(value));
        }

        if vnode.shape.contains(ShapeFlags::TEXT_CHILDREN) {
            self.host.set_element_text(el, vnode.text_content());
        } else if vnode.shape.contains(ShapeFlags::ARRAY_CHILDREN) {
            self.mount_children(child_nodes(vnode), el, None, parent);
        }

        self.host.insert(el, container, anchor);
    }

    fn patch_element(&self, n1: &VNode, n2: &VNode, parent: Option<&Arc<ComponentInstance>>) {
        n2.inherit_mount(n1);
        let Some(el) = n2.el() else {
            warn!("patching an element that was never mounted");
            return;
        };
        self.patch_props(el, &n1.props, &n2.props);
        self.patch_children(n1, n2, el, parent);
    }

    fn patch_props(
        &self,
        el: NodeHandle,
        old_props: &indexmap::IndexMap<String, Value>,
        new_props: &indexmap::IndexMap<String, Value>,
    ) {
        for (key, value) in new_props {
            self.host.patch_prop(el, key, old_props.get(key), Some(value));
        }
        for (key, value) in old_props {
            if !new_props.contains_key(key) {
                self.host.patch_prop(el, key, Some(value), None);
            }
        }
    }

    // ---- fragments --------------------------------------------------

    fn process_fragment(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => {
                self.mount_children(child_nodes(n2), container, anchor, parent);
                // Anchor computations against the fragment use its first
                // child.
                if let Some(first) = child_nodes(n2).first().and_then(|c| c.el()) {
                    n2.set_el(first);
                }
                if let Some(last) = child_nodes(n2).last().and_then(|c| c.el()) {
                    n2.set_anchor(last);
                }
            }
            Some(old) => {
                n2.inherit_mount(old);
                self.patch_children(old, n2, container, parent);
            }
        }
    }

    // ---- components -------------------------------------------------

    fn process_component(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        match n1 {
            None => self.mount_component(n2, container, anchor, parent),
            Some(old) => self.update_component(old, n2),
        }
    }

    fn mount_component(
        &self,
        vnode: &VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let VNodeKind::Component(def) = &vnode.kind else {
            return;
        };

        // Lazy occurrences resolve their real definition at first mount.
        let def = match def.loader() {
            Some(loader) => match loader() {
                Ok(resolved) => resolved,
                Err(err) => {
                    error!(component = def.name(), error = %err, "component load failed");
                    let placeholder = VNode::comment();
                    self.patch(None, &placeholder, container, anchor, parent);
                    vnode.inherit_mount(&placeholder);
                    return;
                }
            },
            None => def.clone(),
        };

        debug!(component = def.name(), "mount component");
        let instance = ComponentInstance::new(def, parent);
        vnode.set_instance(instance.clone());
        instance.init_props(&vnode.props);
        instance.init_slots(&vnode.children);
        instance.init_state();

        self.setup_render_effect(instance, vnode.clone(), container, anchor);
    }

    /// Bind the instance's render effect: run renders the subtree and
    /// patches; triggers enqueue the instance's update job so writes
    /// batch per flush.
    fn setup_render_effect(
        &self,
        instance: Arc<ComponentInstance>,
        vnode: VNode,
        container: NodeHandle,
        anchor: Option<NodeHandle>,
    ) {
        let renderer = self.clone();
        let inst = instance.clone();
        let body = move || {
            let next = inst.take_next();
            if let Some(next) = &next {
                inst.update_props(&next.props);
                inst.init_slots(&next.children);
            }

            let sub_tree = inst.render();
            if !inst.is_mounted() {
                inst.invoke_hooks(LifecyclePhase::BeforeMount);
                renderer.patch(None, &sub_tree, container, anchor, Some(&inst));
                vnode.inherit_mount(&sub_tree);
                inst.set_sub_tree(sub_tree);
                inst.set_mounted();
                let hooked = inst.clone();
                queue_post_flush(move || hooked.invoke_hooks(LifecyclePhase::Mounted));
            } else {
                inst.invoke_hooks(LifecyclePhase::BeforeUpdate);
                let prev = inst.sub_tree();
                renderer.patch(prev.as_ref(), &sub_tree, container, anchor, Some(&inst));
                vnode.inherit_mount(&sub_tree);
                if let Some(next) = &next {
                    next.inherit_mount(&sub_tree);
                }
                inst.set_sub_tree(sub_tree);
                let hooked = inst.clone();
                queue_post_flush(move || hooked.invoke_hooks(LifecyclePhase::Updated));
            }
        };

        let uid = instance.uid();
        let effect_cell: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));
        let cell = effect_cell.clone();
        let effect = Effect::with_scheduler(body, move || {
            let effect = cell.lock().clone();
            if let Some(effect) = effect {
                queue_job(Job::new(uid, move || effect.run()));
            }
        });
        *effect_cell.lock() = Some(effect.clone());
        instance.bind_update(effect.clone());
        effect.run();
    }

    /// Parent-driven update: sync the new vnode onto the instance and
    /// re-render only when slots are present or a prop changed.
    fn update_component(&self, n1: &VNode, n2: &VNode) {
        let Some(instance) = n1.instance() else {
            // Load-failed lazy occurrence; keep the placeholder.
            n2.inherit_mount(n1);
            return;
        };
        n2.set_instance(instance.clone());

        if should_update_component(n1, n2) {
            instance.set_next(n2.clone());
            if let Some(effect) = instance.update_effect() {
                effect.run();
            }
        } else {
            n2.inherit_mount(n1);
        }
    }

    // ---- teleport ---------------------------------------------------

    fn process_teleport(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        target: &str,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let Some(target_el) = self.host.query_selector(target) else {
            warn!(target, "teleport target not found; content skipped");
            return;
        };
        match n1 {
            None => self.mount_children(child_nodes(n2), target_el, None, parent),
            Some(old) => self.patch_children(old, n2, target_el, parent),
        }
    }

    // ---- children ---------------------------------------------------

    fn mount_children(
        &self,
        children: &[VNode],
        container: NodeHandle,
        anchor: Option<NodeHandle>,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        for child in children {
            self.patch(None, child, container, anchor, parent);
        }
    }

    fn unmount_children(&self, children: &[VNode]) {
        for child in children {
            self.unmount(child);
        }
    }

    /// Coarse transitions first (text vs array vs none), then the keyed
    /// diff for array-to-array.
    fn patch_children(
        &self,
        n1: &VNode,
        n2: &VNode,
        container: NodeHandle,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let prev_shape = n1.shape;
        let shape = n2.shape;

        if shape.contains(ShapeFlags::TEXT_CHILDREN) {
            if prev_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                self.unmount_children(child_nodes(n1));
            }
            let changed = !prev_shape.contains(ShapeFlags::TEXT_CHILDREN)
                || n1.text_content() != n2.text_content();
            if changed {
                self.host.set_element_text(container, n2.text_content());
            }
        } else if prev_shape.contains(ShapeFlags::ARRAY_CHILDREN) {
            if shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                self.patch_keyed_children(child_nodes(n1), child_nodes(n2), container, parent);
            } else {
                self.unmount_children(child_nodes(n1));
            }
        } else {
            if prev_shape.contains(ShapeFlags::TEXT_CHILDREN) {
                self.host.set_element_text(container, "");
            }
            if shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                self.mount_children(child_nodes(n2), container, None, parent);
            }
        }
    }

    /// Keyed list diff: patch the stable prefix and suffix, handle pure
    /// mount/unmount remainders, then reconcile the middle window with
    /// a key map and move only nodes outside the longest stable run.
    fn patch_keyed_children(
        &self,
        c1: &[VNode],
        c2: &[VNode],
        container: NodeHandle,
        parent: Option<&Arc<ComponentInstance>>,
    ) {
        let mut i: usize = 0;
        let mut e1: isize = c1.len() as isize - 1;
        let mut e2: isize = c2.len() as isize - 1;

        // Stable prefix.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let n1 = &c1[i];
            let n2 = &c2[i];
            if !is_same_vnode_type(n1, n2) {
                break;
            }
            self.patch(Some(n1), n2, container, None, parent);
            i += 1;
        }

        // Stable suffix.
        while (i as isize) <= e1 && (i as isize) <= e2 {
            let n1 = &c1[e1 as usize];
            let n2 = &c2[e2 as usize];
            if !is_same_vnode_type(n1, n2) {
                break;
            }
            self.patch(Some(n1), n2, container, None, parent);
            e1 -= 1;
            e2 -= 1;
        }

        if (i as isize) > e1 {
            // Only new nodes remain; mount them before the suffix.
            if (i as isize) <= e2 {
                let anchor = c2
                    .get((e2 + 1) as usize)
                    .and_then(|n| n.el());
                while (i as isize) <= e2 {
                    self.patch(None, &c2[i], container, anchor, parent);
                    i += 1;
                }
            }
        } else if (i as isize) > e2 {
            // Only old nodes remain; unmount them.
            while (i as isize) <= e1 {
                self.unmount(&c1[i]);
                i += 1;
            }
        } else {
            let s1 = i;
            let s2 = i;
            let to_patch = (e2 - s2 as isize + 1) as usize;

            // New position by key, for the middle window.
            let mut key_to_new: HashMap<Key, usize> = HashMap::new();
            for (j, child) in c2.iter().enumerate().take(e2 as usize + 1).skip(s2) {
                if let Some(key) = &child.key {
                    if key_to_new.insert(key.clone(), j).is_some() {
                        warn!(?key, "duplicate key among keyed children");
                    }
                }
            }

            // For each new middle child, its old index + 1. Zero means
            // it has no old counterpart and must be created.
            let mut new_index_to_old: Vec<usize> = vec![0; to_patch];
            for (j, prev) in c1.iter().enumerate().take(e1 as usize + 1).skip(s1) {
                let new_index = prev
                    .key
                    .as_ref()
                    .and_then(|k| key_to_new.get(k))
                    .copied();
                match new_index {
                    None => self.unmount(prev),
                    Some(ni) => {
                        new_index_to_old[ni - s2] = j + 1;
                        self.patch(Some(prev), &c2[ni], container, None, parent);
                    }
                }
            }

            // Nodes inside the longest stable run stay put; walk the
            // window backwards so the anchor is always already placed.
            let stable = longest_increasing_subsequence(&new_index_to_old);
            let mut j = stable.len() as isize - 1;
            for idx in (0..to_patch).rev() {
                let next_index = s2 + idx;
                let next_child = &c2[next_index];
                let anchor = c2.get(next_index + 1).and_then(|n| n.el());
                if new_index_to_old[idx] == 0 {
                    self.patch(None, next_child, container, anchor, parent);
                } else if j < 0 || idx != stable[j as usize] {
                    if let Some(el) = next_child.el() {
                        self.host.insert(el, container, anchor);
                    }
                } else {
                    j -= 1;
                }
            }
        }
    }

    // ---- unmount ----------------------------------------------------

    fn unmount(&self, vnode: &VNode) {
        self.unmount_vnode(vnode, true);
    }

    /// Tear down a subtree. `detach` is false for descendants of a host
    /// node already being removed; components still run their hooks.
    fn unmount_vnode(&self, vnode: &VNode, detach: bool) {
        match &vnode.kind {
            VNodeKind::Fragment => {
                for child in child_nodes(vnode) {
                    self.unmount_vnode(child, detach);
                }
            }
            VNodeKind::Teleport { .. } => {
                // Teleported content lives outside this subtree, so it
                // always detaches itself.
                for child in child_nodes(vnode) {
                    self.unmount_vnode(child, true);
                }
            }
            VNodeKind::Component(_) => match vnode.instance() {
                Some(instance) => {
                    debug!(component = instance.def().name(), "unmount component");
                    instance.invoke_hooks(LifecyclePhase::BeforeUnmount);
                    if let Some(effect) = instance.update_effect() {
                        effect.stop();
                    }
                    if let Some(sub_tree) = instance.sub_tree() {
                        self.unmount_vnode(&sub_tree, detach);
                    }
                    queue_post_flush(move || {
                        instance.invoke_hooks(LifecyclePhase::Unmounted)
                    });
                }
                None => {
                    // Load-failed placeholder.
                    if detach {
                        if let Some(el) = vnode.el() {
                            self.host.remove(el);
                        }
                    }
                }
            },
            _ => {
                if vnode.shape.contains(ShapeFlags::ARRAY_CHILDREN) {
                    for child in child_nodes(vnode) {
                        self.unmount_vnode(child, false);
                    }
                }
                if detach {
                    if let Some(el) = vnode.el() {
                        self.host.remove(el);
                    }
                }
            }
        }
    }
}
