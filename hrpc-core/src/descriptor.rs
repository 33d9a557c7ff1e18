use crate::error::RpcError;

/// Signature of one remote-callable method. Method ids on the wire are
/// plain method names, so a descriptor can never hold two methods with the
/// same name.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    name: String,
    param_types: Vec<String>,
    return_type: String,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        param_types: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        MethodDescriptor {
            name: name.into(),
            param_types,
            return_type: return_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.param_types.len()
    }

    pub fn param_types(&self) -> &[String] {
        &self.param_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }
}

/// Identifies one remote-callable interface: a stable service id, the
/// registration package used for scan filtering, an optional group tag for
/// routing, and the method signatures. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    service_id: String,
    package: String,
    group: Option<String>,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn builder(service_id: impl Into<String>, package: impl Into<String>) -> Builder {
        Builder {
            service_id: service_id.into(),
            package: package.into(),
            group: None,
            methods: Vec::new(),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name() == name)
    }

    /// Rejects descriptors the method-id scheme cannot represent.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.service_id.is_empty() {
            return Err(RpcError::Configuration(
                "service id must not be empty".to_string(),
            ));
        }
        for (i, method) in self.methods.iter().enumerate() {
            if self.methods[..i].iter().any(|m| m.name() == method.name()) {
                return Err(RpcError::Configuration(format!(
                    "service {} declares method {} more than once; overloads are not \
                     distinguishable by method name",
                    self.service_id,
                    method.name()
                )));
            }
        }
        Ok(())
    }
}

pub struct Builder {
    service_id: String,
    package: String,
    group: Option<String>,
    methods: Vec<MethodDescriptor>,
}

impl Builder {
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        param_types: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        self.methods
            .push(MethodDescriptor::new(name, param_types, return_type));
        self
    }

    pub fn build(self) -> ServiceDescriptor {
        ServiceDescriptor {
            service_id: self.service_id,
            package: self.package,
            group: self.group,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_descriptor() -> ServiceDescriptor {
        ServiceDescriptor::builder("sample.spi.HelloService", "sample.spi")
            .method("greet", vec!["String".to_string()], "String")
            .method("farewell", vec!["String".to_string()], "String")
            .build()
    }

    #[test]
    fn test_builder_and_lookup() {
        let descriptor = hello_descriptor();
        assert_eq!(descriptor.service_id(), "sample.spi.HelloService");
        assert_eq!(descriptor.package(), "sample.spi");
        assert_eq!(descriptor.group(), None);
        assert_eq!(descriptor.methods().len(), 2);

        let greet = descriptor.method("greet").unwrap();
        assert_eq!(greet.arity(), 1);
        assert_eq!(greet.param_types(), ["String".to_string()]);
        assert_eq!(greet.return_type(), "String");

        assert!(descriptor.method("missing").is_none());
    }

    #[test]
    fn test_group_tag() {
        let descriptor = ServiceDescriptor::builder("svc", "pkg")
            .group("v2")
            .method("m", vec![], "()")
            .build();
        assert_eq!(descriptor.group(), Some("v2"));
    }

    #[test]
    fn test_validate_accepts_distinct_methods() {
        assert!(hello_descriptor().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_overloads() {
        let descriptor = ServiceDescriptor::builder("svc", "pkg")
            .method("greet", vec!["String".to_string()], "String")
            .method("greet", vec!["i64".to_string()], "String")
            .build();
        let err = descriptor.validate().unwrap_err();
        assert!(matches!(err, RpcError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_empty_service_id() {
        let descriptor = ServiceDescriptor::builder("", "pkg").build();
        assert!(matches!(
            descriptor.validate(),
            Err(RpcError::Configuration(_))
        ));
    }
}
