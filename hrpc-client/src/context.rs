use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::proxy::{RemoteProxy, ServiceProxy};
use crate::registry::ServiceRegistry;
use hrpc_core::{RpcError, ServiceDescriptor};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Explicit dependency container for the client core: built once at
/// process start and passed by reference to whatever needs proxies. There
/// is no ambient global lookup.
pub struct ClientContext {
    dispatcher: Arc<Dispatcher>,
    proxies: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    descriptors: HashMap<String, Arc<ServiceDescriptor>>,
}

impl ClientContext {
    /// Validates the configuration, builds the connection pool and
    /// dispatcher, scans the registry and constructs one proxy per
    /// selected interface. Must run inside a Tokio runtime; the pool's
    /// maintenance task is spawned here.
    pub fn bootstrap(config: ClientConfig, registry: &ServiceRegistry) -> Result<Self, RpcError> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::from_config(&config));
        let mut context = ClientContext {
            dispatcher: dispatcher.clone(),
            proxies: HashMap::new(),
            descriptors: HashMap::new(),
        };

        let selected = registry.scan(&config.base_packages)?;
        debug!(count = selected.len(), "building proxies for scanned services");
        for registration in selected {
            let descriptor = Arc::new(registration.descriptor().clone());
            let proxy = ServiceProxy::new(descriptor.clone(), dispatcher.clone(), config.timeout());
            context
                .descriptors
                .insert(descriptor.service_id().to_string(), descriptor);
            context
                .proxies
                .insert(registration.type_id(), (registration.construct())(proxy));
        }

        Ok(context)
    }

    /// Retrieves the proxy built for interface type `P`: the `getBean`
    /// equivalent for containers layered on top of this core.
    pub fn proxy<P: RemoteProxy>(&self) -> Result<P, RpcError> {
        self.proxies
            .get(&TypeId::of::<P>())
            .and_then(|boxed| boxed.downcast_ref::<P>())
            .cloned()
            .ok_or_else(|| {
                RpcError::Configuration(format!("no proxy registered for {}", type_name::<P>()))
            })
    }

    /// Registers an externally built proxy instance under its interface
    /// type, replacing any instance the bootstrap built.
    pub fn insert_proxy<P: RemoteProxy>(&mut self, instance: P) {
        self.proxies.insert(TypeId::of::<P>(), Box::new(instance));
    }

    pub fn descriptor(&self, service_id: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.descriptors.get(service_id)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("proxies", &self.proxies.len())
            .field("services", &self.descriptors.len())
            .finish()
    }
}
