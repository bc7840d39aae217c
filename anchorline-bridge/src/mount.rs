// anchorline-bridge/src/mount.rs
//
// Component Mount Registry. Holds every live UI component instance, keyed
// by block id. One live instance per id: mounting again under the same id
// destroys the old instance first.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anchorline_core::{BlockId, Container};
use serde_json::{Map, Value};
use thiserror::Error;

/// Input map handed to a component (the block's serialized fields).
pub type ComponentInputs = Map<String, Value>;

/// Actions a mounted component can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOutput {
    Insert,
    Execute,
    Reject,
    ToggleCollapse,
}

pub type OutputSink = Rc<dyn Fn(ComponentOutput)>;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("no component named {0:?}")]
    UnknownComponent(String),
    #[error("component {component:?} failed to mount: {reason}")]
    Failed { component: String, reason: String },
}

pub trait MountedComponent {
    fn set_inputs(&mut self, inputs: &ComponentInputs);
    fn destroy(&mut self);
}

/// Renders components by name into containers.
pub trait ComponentFactory {
    fn mount(
        &self,
        component: &str,
        container: &Container,
        inputs: &ComponentInputs,
        outputs: OutputSink,
    ) -> Result<Box<dyn MountedComponent>, MountError>;
}

type Instance = Rc<RefCell<Box<dyn MountedComponent>>>;

struct Live {
    component: String,
    container: Container,
    instance: Instance,
}

#[derive(Default)]
pub struct MountRegistry {
    live: RefCell<HashMap<BlockId, Live>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(
        &self,
        id: &BlockId,
        factory: &dyn ComponentFactory,
        component: &str,
        container: &Container,
        inputs: &ComponentInputs,
        outputs: OutputSink,
    ) -> Result<(), MountError> {
        let previous = self.live.borrow_mut().remove(id);
        if let Some(old) = previous {
            tracing::debug!(block_id = %id, component = %old.component, "replacing mounted component");
            destroy_instance(id, &old.instance);
        }

        let instance = factory.mount(component, container, inputs, outputs)?;
        let live = Live {
            component: component.to_string(),
            container: container.clone(),
            instance: Rc::new(RefCell::new(instance)),
        };

        // A component may have mounted another one under this id while we
        // were outside the borrow.
        let displaced = self.live.borrow_mut().insert(id.clone(), live);
        if let Some(other) = displaced {
            destroy_instance(id, &other.instance);
        }
        Ok(())
    }

    /// Push new inputs to a live component. False for unknown ids.
    pub fn update(&self, id: &BlockId, inputs: &ComponentInputs) -> bool {
        let instance = self.live.borrow().get(id).map(|l| l.instance.clone());
        let Some(instance) = instance else {
            tracing::warn!(block_id = %id, "input update for unmounted block");
            return false;
        };
        match instance.try_borrow_mut() {
            Ok(mut component) => {
                component.set_inputs(inputs);
                true
            }
            Err(_) => {
                tracing::warn!(block_id = %id, "re-entrant input update dropped");
                false
            }
        }
    }

    pub fn destroy(&self, id: &BlockId) -> bool {
        let removed = self.live.borrow_mut().remove(id);
        match removed {
            Some(live) => {
                destroy_instance(id, &live.instance);
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&self) -> usize {
        let drained: Vec<(BlockId, Live)> = self.live.borrow_mut().drain().collect();
        for (id, live) in &drained {
            destroy_instance(id, &live.instance);
        }
        drained.len()
    }

    pub fn is_mounted(&self, id: &BlockId) -> bool {
        self.live.borrow().contains_key(id)
    }

    pub fn component_name(&self, id: &BlockId) -> Option<String> {
        self.live.borrow().get(id).map(|l| l.component.clone())
    }

    pub fn container(&self, id: &BlockId) -> Option<Container> {
        self.live.borrow().get(id).map(|l| l.container.clone())
    }

    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }
}

fn destroy_instance(id: &BlockId, instance: &Instance) {
    match instance.try_borrow_mut() {
        Ok(mut component) => component.destroy(),
        Err(_) => tracing::warn!(block_id = %id, "component busy; destroy skipped"),
    }
}

impl std::fmt::Debug for MountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRegistry")
            .field("live", &self.len())
            .finish()
    }
}
