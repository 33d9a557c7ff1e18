use crate::proxy::{RemoteProxy, ServiceProxy};
use hrpc_core::{RpcError, ServiceDescriptor};
use std::any::{type_name, Any, TypeId};
use tracing::debug;

type ProxyConstructor = fn(ServiceProxy) -> Box<dyn Any + Send + Sync>;

/// One explicitly registered remote interface: its descriptor, the proxy
/// type it materializes as, and how to construct that proxy.
pub struct Registration {
    descriptor: ServiceDescriptor,
    type_id: TypeId,
    type_name: &'static str,
    construct: ProxyConstructor,
}

impl Registration {
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn construct(&self) -> ProxyConstructor {
        self.construct
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("service", &self.descriptor.service_id())
            .field("proxy_type", &self.type_name)
            .finish()
    }
}

/// Explicit startup-time registry of remote service interfaces, replacing
/// classpath annotation scanning. Interfaces declared with
/// `remote_service!` are registered here; `scan` selects and validates
/// the set the bootstrap builds proxies for.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    registrations: Vec<Registration>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: RemoteProxy>(&mut self) -> &mut Self {
        let descriptor = P::descriptor();
        debug!(
            service = descriptor.service_id(),
            proxy = type_name::<P>(),
            "registered remote service"
        );
        self.registrations.push(Registration {
            descriptor,
            type_id: TypeId::of::<P>(),
            type_name: type_name::<P>(),
            construct: |proxy| Box::new(P::from_proxy(proxy)),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Selects the registrations whose package falls under one of
    /// `base_packages` (all of them when the list is empty) and validates
    /// the resulting set: every descriptor must be well-formed and no two
    /// may collide on service id.
    pub fn scan(&self, base_packages: &[String]) -> Result<Vec<&Registration>, RpcError> {
        let selected: Vec<&Registration> = self
            .registrations
            .iter()
            .filter(|registration| {
                base_packages.is_empty()
                    || base_packages
                        .iter()
                        .any(|base| package_matches(base, registration.descriptor.package()))
            })
            .collect();

        for (i, registration) in selected.iter().enumerate() {
            registration.descriptor.validate()?;
            if let Some(previous) = selected[..i]
                .iter()
                .find(|other| other.descriptor.service_id() == registration.descriptor.service_id())
            {
                return Err(RpcError::Configuration(format!(
                    "service id {} is declared by both {} and {}",
                    registration.descriptor.service_id(),
                    previous.type_name,
                    registration.type_name
                )));
            }
        }

        Ok(selected)
    }
}

/// `base` selects its own package and every sub-package.
fn package_matches(base: &str, package: &str) -> bool {
    package
        .strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}
