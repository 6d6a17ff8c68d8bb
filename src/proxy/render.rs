//! Route rendering.
//!
//! Output depends only on its inputs: blocks are ordered by instance name,
//! one block per built instance. Unbuilt instances get no route. Stopped
//! instances keep their path but answer 503 instead of proxying.

use crate::config::{ProxyEngine, Settings};
use crate::registry::Instance;

pub const HEADER: &str = "# Generated by senex; manual edits are overwritten.";

const UPSTREAM_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteState {
    Running,
    Stopped,
}

impl RouteState {
    fn of(instance: &Instance) -> Self {
        if instance.running {
            Self::Running
        } else {
            Self::Stopped
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

fn routed(instances: &[Instance]) -> Vec<&Instance> {
    let mut routed: Vec<&Instance> = instances.iter().filter(|i| i.built).collect();
    routed.sort_by(|a, b| a.name.cmp(&b.name));
    routed
}

fn render_nginx(routes: &[&Instance], settings: &Settings) -> Vec<String> {
    let mut lines = vec![
        "server {".to_string(),
        format!("    listen {};", settings.listen_port),
        format!("    server_name {};", settings.host),
    ];

    for instance in routes {
        let state = RouteState::of(instance);
        lines.push(String::new());
        lines.push(format!("    # instance {} ({})", instance.name, state.label()));
        lines.push(format!("    location /{}/ {{", instance.namespace));
        match state {
            RouteState::Running => {
                lines.push(format!(
                    "        proxy_pass http://{}:{}/;",
                    UPSTREAM_HOST, instance.port
                ));
                lines.push("        proxy_set_header Host $host;".to_string());
                lines.push("        proxy_set_header X-Real-IP $remote_addr;".to_string());
                lines.push(
                    "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"
                        .to_string(),
                );
                lines.push("        proxy_set_header X-Forwarded-Proto $scheme;".to_string());
                lines.push(format!(
                    "        proxy_set_header X-Script-Name /{};",
                    instance.namespace
                ));
            }
            RouteState::Stopped => lines.push("        return 503;".to_string()),
        }
        lines.push("    }".to_string());
    }

    lines.push("}".to_string());
    lines
}

fn render_apache(routes: &[&Instance], settings: &Settings) -> Vec<String> {
    let mut lines = vec![
        format!("<VirtualHost *:{}>", settings.listen_port),
        format!("    ServerName {}", settings.host),
        "    ProxyPreserveHost On".to_string(),
    ];
    if routes.iter().any(|i| !i.running) {
        lines.push("    RewriteEngine On".to_string());
    }

    for instance in routes {
        let state = RouteState::of(instance);
        lines.push(String::new());
        lines.push(format!("    # instance {} ({})", instance.name, state.label()));
        match state {
            RouteState::Running => {
                let upstream = format!("http://{}:{}/", UPSTREAM_HOST, instance.port);
                lines.push(format!("    <Location /{}/>", instance.namespace));
                lines.push(format!("        ProxyPass {}", upstream));
                lines.push(format!("        ProxyPassReverse {}", upstream));
                lines.push(format!(
                    "        RequestHeader set X-Script-Name /{}",
                    instance.namespace
                ));
                lines.push("    </Location>".to_string());
            }
            RouteState::Stopped => lines.push(format!(
                "    RewriteRule \"^/{}/\" \"-\" [R=503,L]",
                instance.namespace
            )),
        }
    }

    lines.push("</VirtualHost>".to_string());
    lines
}

/// Render the complete proxy config for `instances` under `settings`.
pub fn render(instances: &[Instance], settings: &Settings) -> String {
    let routes = routed(instances);
    let body = match settings.proxy_engine {
        ProxyEngine::Nginx => render_nginx(&routes, settings),
        ProxyEngine::Apache => render_apache(&routes, settings),
    };

    let mut text = String::from(HEADER);
    text.push('\n');
    for line in body {
        text.push_str(&line);
        text.push('\n');
    }
    text
}
