//! Component registry.
//!
//! Components are registered as factories under `library/name` (or a bare
//! name). Graph documents and graph files can be registered as well; loading
//! one of those yields a [`SubgraphComponent`] on the next scheduler turn.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;
use wf_core::{FlowError, FlowResult, Scheduler};
use wf_graph::GraphDocument;

use crate::component::{Component, ComponentContext};
use crate::subgraph::{GraphSource, SubgraphComponent};

pub type Factory = Rc<dyn Fn(&ComponentContext) -> FlowResult<Rc<dyn Component>>>;

#[derive(Clone)]
enum Registration {
    Factory(Factory),
    Graph(GraphSource),
}

pub struct ComponentLoader {
    base_dir: String,
    scheduler: Rc<Scheduler>,
    components: RefCell<IndexMap<String, Registration>>,
    library_icons: RefCell<HashMap<String, String>>,
}

impl fmt::Debug for ComponentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLoader")
            .field("base_dir", &self.base_dir)
            .field("components", &self.components.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComponentLoader {
    /// Create a loader with the built-in `Graph` component registered.
    pub fn new(base_dir: impl Into<String>, scheduler: Rc<Scheduler>) -> Rc<Self> {
        let loader = Rc::new(Self {
            base_dir: base_dir.into(),
            scheduler,
            components: RefCell::new(IndexMap::new()),
            library_icons: RefCell::new(HashMap::new()),
        });
        loader.register_component("", "Graph", |ctx| {
            Ok(SubgraphComponent::new(ctx) as Rc<dyn Component>)
        });
        loader
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn context(self: &Rc<Self>) -> ComponentContext {
        ComponentContext {
            scheduler: Rc::clone(&self.scheduler),
            base_dir: self.base_dir.clone(),
            loader: Rc::clone(self),
        }
    }

    /// Register a factory as `library/name`, or as `name` when `library` is empty.
    pub fn register_component<F>(&self, library: &str, name: &str, factory: F)
    where
        F: Fn(&ComponentContext) -> FlowResult<Rc<dyn Component>> + 'static,
    {
        self.register(library, name, Registration::Factory(Rc::new(factory)));
    }

    /// Register a graph to be instantiated as a subgraph component.
    pub fn register_graph(&self, library: &str, name: &str, source: GraphSource) {
        self.register(library, name, Registration::Graph(source));
    }

    pub fn set_library_icon(&self, library: &str, icon: &str) {
        self.library_icons
            .borrow_mut()
            .insert(library.to_string(), icon.to_string());
    }

    pub fn library_icon(&self, library: &str) -> Option<String> {
        self.library_icons.borrow().get(library).cloned()
    }

    /// Registered names in registration order.
    pub fn list_components(&self) -> Vec<String> {
        self.components.borrow().keys().cloned().collect()
    }

    pub fn is_graph(&self, name: &str) -> bool {
        matches!(self.resolve(name), Some((_, Registration::Graph(_))))
    }

    /// Instantiate `name` and hand it to `callback`.
    ///
    /// Factories run immediately. Registered graphs are built on the next
    /// scheduler turn. An unknown name falls back to the first registration
    /// whose component part (after `/`) matches.
    pub fn load<F>(self: &Rc<Self>, name: &str, callback: F) -> FlowResult<()>
    where
        F: FnOnce(Rc<dyn Component>) -> FlowResult<()> + 'static,
    {
        let Some((resolved, registration)) = self.resolve(name) else {
            return Err(FlowError::ComponentNotAvailable {
                name: name.to_string(),
                base_dir: self.base_dir.clone(),
            });
        };
        debug!(name, resolved = %resolved, "loading component");

        match registration {
            Registration::Factory(factory) => {
                let instance = factory(&self.context())?;
                self.apply_icon(&resolved, instance.as_ref());
                callback(instance)
            }
            Registration::Graph(source) => {
                self.load_graph(resolved, source, callback);
                Ok(())
            }
        }
    }

    /// Instantiate an inline graph document as a subgraph, on the next turn.
    pub fn load_document<F>(self: &Rc<Self>, doc: GraphDocument, callback: F)
    where
        F: FnOnce(Rc<dyn Component>) -> FlowResult<()> + 'static,
    {
        let name = doc.name().to_string();
        self.load_graph(name, GraphSource::Document(doc), callback);
    }

    fn load_graph<F>(self: &Rc<Self>, name: String, source: GraphSource, callback: F)
    where
        F: FnOnce(Rc<dyn Component>) -> FlowResult<()> + 'static,
    {
        let loader = Rc::clone(self);
        self.scheduler.defer(move || {
            let instance: Rc<dyn Component> =
                SubgraphComponent::from_source(&loader.context(), source)?;
            loader.apply_icon(&name, instance.as_ref());
            callback(instance)
        });
    }

    fn register(&self, library: &str, name: &str, registration: Registration) {
        let full_name = if library.is_empty() {
            name.to_string()
        } else {
            format!("{library}/{name}")
        };
        debug!(component = %full_name, "registered");
        self.components.borrow_mut().insert(full_name, registration);
    }

    fn resolve(&self, name: &str) -> Option<(String, Registration)> {
        let components = self.components.borrow();
        if let Some(registration) = components.get(name) {
            return Some((name.to_string(), registration.clone()));
        }
        components
            .iter()
            .find(|(full, _)| full.split('/').nth(1) == Some(name))
            .map(|(full, registration)| (full.clone(), registration.clone()))
    }

    /// Library icon, else `sitemap` for subgraphs, else `blank`.
    fn apply_icon(&self, name: &str, instance: &dyn Component) {
        if instance.icon().is_some() {
            return;
        }
        if let Some((library, _)) = name.split_once('/') {
            if let Some(icon) = self.library_icon(library) {
                instance.set_icon(&icon);
                return;
            }
        }
        if instance.is_subgraph() {
            instance.set_icon("sitemap");
        } else {
            instance.set_icon("blank");
        }
    }
}
