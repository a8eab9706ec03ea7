//! Detect built in packages for node declared as ESM imports
//! or CommonJS require expressions.
//!
//! Run `node -p "require('module').builtinModules"` to generate the
//! list of built in packages for a version of node.
//!

/// Prefix that always denotes a built in module.
pub const NODE_PREFIX: &str = "node:";

/// List of built in packages for latest stable node with LTS.
pub const NODE_LATEST_STABLE: &[&str] = &[
    "_http_agent",
    "_http_client",
    "_http_common",
    "_http_incoming",
    "_http_outgoing",
    "_http_server",
    "_stream_duplex",
    "_stream_passthrough",
    "_stream_readable",
    "_stream_transform",
    "_stream_wrap",
    "_stream_writable",
    "_tls_common",
    "_tls_wrap",
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "inspector/promises",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Determine if a package is a core package.
pub fn is_builtin_module(s: &str) -> bool {
    s.starts_with(NODE_PREFIX) || NODE_LATEST_STABLE.contains(&s)
}

/// Determine if a specifier looks like a package local path.
///
/// A local path is one that uses either a relative or absolute
/// file system path.
pub fn is_local_module(s: &str) -> bool {
    s == "."
        || s == ".."
        || s.starts_with("./")
        || s.starts_with("../")
        || s.starts_with('/')
}

/// Determine if a module appears to be a third-party dependency.
pub fn is_dependent_module(s: &str) -> bool {
    !is_builtin_module(s) && !is_local_module(s)
}

/// Split a bare specifier into the package name and an optional
/// sub path, scoped packages keep their scope.
///
/// `@babel/core/lib/index.js` yields `("@babel/core", Some("lib/index.js"))`.
pub fn split_package_specifier(s: &str) -> (&str, Option<&str>) {
    let mut parts = s.splitn(3, '/');
    let first = parts.next().unwrap_or("");
    let end = if first.starts_with('@') {
        match parts.next() {
            Some(second) => first.len() + 1 + second.len(),
            None => return (s, None),
        }
    } else {
        first.len()
    };
    if end >= s.len() {
        (s, None)
    } else {
        (&s[..end], Some(&s[end + 1..]))
    }
}

/// Last path segment of a package name, `@scope/name` yields `name`.
pub fn package_basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
