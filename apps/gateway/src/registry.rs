use crate::config::Config;

/// Registry entry mapping a logical service name to its base URL.
/// Immutable after startup load.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub base_url: String,
}

/// Static mapping of logical service name -> base URL, plus the route
/// prefixes the router forwards under. Built once from `Config` and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptor>,
    routes: Vec<(&'static str, &'static str)>, // (route prefix, service name)
}

impl ServiceRegistry {
    pub fn from_config(config: &Config) -> Self {
        let services = vec![
            ServiceDescriptor {
                name: "auth",
                base_url: config.auth_service_url.clone(),
            },
            ServiceDescriptor {
                name: "user",
                base_url: config.user_service_url.clone(),
            },
            ServiceDescriptor {
                name: "cv",
                base_url: config.cv_service_url.clone(),
            },
            ServiceDescriptor {
                name: "export",
                base_url: config.export_service_url.clone(),
            },
            ServiceDescriptor {
                name: "ai",
                base_url: config.ai_service_url.clone(),
            },
            ServiceDescriptor {
                name: "payment",
                base_url: config.payment_service_url.clone(),
            },
        ];

        let routes = vec![
            ("/api/auth", "auth"),
            ("/api/users", "user"),
            ("/api/cv", "cv"),
            ("/api/export", "export"),
            ("/api/ai", "ai"),
            ("/api/payments", "payment"),
        ];

        Self { services, routes }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn all(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Resolves a request path to its target service and the remainder
    /// of the path after the matched prefix is stripped.
    ///
    /// `/api/cv/list` -> (cv descriptor, "/list"); `/api/cv` -> (cv, "/").
    /// Returns `None` for paths under no registered prefix.
    pub fn resolve(&self, path: &str) -> Option<(&ServiceDescriptor, String)> {
        for (prefix, name) in &self.routes {
            if let Some(rest) = path.strip_prefix(prefix) {
                // Reject prefix-sharing paths like /api/authx.
                if !rest.is_empty() && !rest.starts_with('/') {
                    continue;
                }
                let descriptor = self.get(name)?;
                let remainder = if rest.is_empty() { "/" } else { rest };
                return Some((descriptor, remainder.to_string()));
            }
        }
        None
    }
}
