use std::net::IpAddr;

/// Restrictions attached to an authorized key.
///
/// The options are written before the key as a comma-separated list, for example
/// `no-pty,from="*.example.com,!bad.example.com",command="uptime"`. Option names are
/// case-insensitive and values are in double quotes, where `\"` stands for a literal quote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct KeyOptions {
    /// `cert-authority`: the key may only be used to verify certificates, never directly.
    pub cert_authority: bool,
    /// `no-port-forwarding`.
    pub no_port_forwarding: bool,
    /// `no-agent-forwarding`.
    pub no_agent_forwarding: bool,
    /// `no-X11-forwarding`.
    pub no_x11_forwarding: bool,
    /// `no-pty`.
    pub no_pty: bool,
    /// `no-user-rc`.
    pub no_user_rc: bool,
    /// `command="..."`: forced command.
    pub command: Option<String>,
    /// `environment="NAME=value"`, may be repeated.
    pub environment: Vec<(String, String)>,
    /// `from="pattern-list"`: patterns for the client host name or address.
    pub from: Option<Vec<String>>,
    /// `permitopen="host:port"`, may be repeated.
    pub permitopen: Vec<String>,
    /// `principals="name-list"`.
    pub principals: Option<String>,
    /// `tunnel="n"`: forced tunnel device.
    pub tunnel: Option<u32>,
}

impl KeyOptions {
    /// Parses the options string of a key.
    ///
    /// Unknown options and malformed values are errors, so the key must not be used.
    pub fn parse(options: &str) -> Result<Self, &'static str> {
        let mut parsed = KeyOptions::default();
        let mut rest = options;
        while !rest.is_empty() {
            let name_len = rest.find(|c: char| c == '=' || c == ',').unwrap_or(rest.len());
            let name = &rest[..name_len];
            rest = &rest[name_len..];

            let value = match rest.strip_prefix('=') {
                Some(quoted) => {
                    let (value, after) = read_quoted(quoted)?;
                    rest = after;
                    Some(value)
                },
                None => None,
            };
            parsed.apply(name, value)?;

            match rest.strip_prefix(',') {
                Some(after) if !after.is_empty() => rest = after,
                Some(_) => return Err("options end with a comma"),
                None if rest.is_empty() => {},
                None => return Err("expected a comma between options"),
            }
        }
        Ok(parsed)
    }

    fn apply(&mut self, name: &str, value: Option<String>) -> Result<(), &'static str> {
        let flag = |value: Option<String>| match value {
            None => Ok(true),
            Some(_) => Err("flag option does not take a value"),
        };
        let required = |value: Option<String>| value.ok_or("option requires a value");

        match name.to_ascii_lowercase().as_str() {
            "cert-authority" => self.cert_authority = flag(value)?,
            "no-port-forwarding" => self.no_port_forwarding = flag(value)?,
            "no-agent-forwarding" => self.no_agent_forwarding = flag(value)?,
            "no-x11-forwarding" => self.no_x11_forwarding = flag(value)?,
            "no-pty" => self.no_pty = flag(value)?,
            "no-user-rc" => self.no_user_rc = flag(value)?,
            "command" => self.command = Some(required(value)?),
            "environment" => {
                let value = required(value)?;
                let (var, val) = value.split_once('=').ok_or("environment must be NAME=value")?;
                if var.is_empty() || !var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err("invalid environment variable name")
                }
                self.environment.push((var.into(), val.into()));
            },
            "from" => {
                let patterns = required(value)?.split(',')
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>();
                if patterns.is_empty() {
                    return Err("from requires at least one pattern")
                }
                self.from = Some(patterns);
            },
            "permitopen" => {
                let value = required(value)?;
                let (host, port) = value.rsplit_once(':').ok_or("permitopen must be host:port")?;
                if host.is_empty() || !(port == "*" || port.parse::<u16>().is_ok()) {
                    return Err("invalid permitopen")
                }
                self.permitopen.push(value);
            },
            "principals" => self.principals = Some(required(value)?),
            "tunnel" => {
                let tunnel = required(value)?.parse().map_err(|_| "tunnel must be a number")?;
                self.tunnel = Some(tunnel);
            },
            _ => return Err("unknown option"),
        }
        Ok(())
    }

    /// Checks the `from=` restriction against the client.
    ///
    /// Returns true if there is no restriction. A negated pattern that matches the host name or
    /// the address always denies.
    pub fn allows_client(&self, client: Option<&ClientAddr>) -> bool {
        let Some(patterns) = &self.from else { return true };
        let Some(client) = client else {
            log::debug!("key has a from= restriction, but the client address is unknown");
            return false
        };

        let ip = client.ip.to_string();
        let host = client.host.as_deref().map(str::to_ascii_lowercase);
        let mut allowed = false;
        for pattern in patterns.iter() {
            let (is_negated, pattern) = match pattern.strip_prefix('!') {
                Some(pattern) => (true, pattern),
                None => (false, pattern.as_str()),
            };
            let Some(regex) = pattern_to_regex(&pattern.to_ascii_lowercase()) else {
                log::debug!("invalid from= pattern {:?}", pattern);
                return false
            };

            let matches = regex.is_match(&ip) || host.as_deref().map_or(false, |h| regex.is_match(h));
            if matches {
                if is_negated {
                    return false
                }
                allowed = true;
            }
        }
        allowed
    }
}

/// Reads a value in double quotes; returns the unescaped value and the rest of the input.
fn read_quoted(input: &str) -> Result<(String, &str), &'static str> {
    let mut chars = input.char_indices();
    if !matches!(chars.next(), Some((_, '"'))) {
        return Err("option value must be quoted")
    }

    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if input[i + 1..].starts_with('"') => {
                chars.next();
                value.push('"');
            },
            '"' => return Ok((value, &input[i + 1..])),
            c => value.push(c),
        }
    }
    Err("missing end quote in option value")
}

fn pattern_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut regex = String::new();
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            c if regex_syntax::is_meta_character(c) => {
                regex.push('\\');
                regex.push(c);
            },
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex::Regex::new(&regex).ok()
}

/// Address of the connected client, used to evaluate `from=` restrictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr {
    /// Host name of the client from reverse lookup, if known.
    pub host: Option<String>,
    /// IP address of the client.
    pub ip: IpAddr,
}

/// Decides whether a key may be used, given its options.
pub trait OptionsPolicy {
    /// Parses the options of a key and checks them against the current connection.
    ///
    /// Returns `None` if the key must not be used; the key is then treated as not found.
    fn parse(&self, options: &str) -> Option<KeyOptions>;
}

/// The standard policy: options must parse and the `from=` restriction must match the client.
#[derive(Debug, Clone, Default)]
pub struct StandardOptionsPolicy {
    client: Option<ClientAddr>,
}

impl StandardOptionsPolicy {
    /// Creates a policy for a connection from `client`.
    ///
    /// Without a client address, every key with a `from=` restriction is rejected.
    pub fn new(client: Option<ClientAddr>) -> Self {
        Self { client }
    }
}

impl OptionsPolicy for StandardOptionsPolicy {
    fn parse(&self, options: &str) -> Option<KeyOptions> {
        let parsed = match KeyOptions::parse(options) {
            Ok(parsed) => parsed,
            Err(msg) => {
                log::info!("bad key options {:?}: {}", options, msg);
                return None
            },
        };

        if !parsed.allows_client(self.client.as_ref()) {
            log::info!("key is not allowed from this client by its from= option");
            return None
        }
        Some(parsed)
    }
}
