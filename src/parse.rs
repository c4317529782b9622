use anyhow::Result;

/// Split `host[:port]`, falling back to `default_port` when no port is given.
/// Bracketed IPv6 literals (`[::1]:2222`) are accepted.
pub fn parse_host_port(input: &str, default_port: u16) -> Result<(String, u16)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow::anyhow!("host is empty"));
    }

    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) =
            rest.split_once(']').ok_or_else(|| anyhow::anyhow!("unterminated '[' in {}", input))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| anyhow::anyhow!("invalid port: {}", p))?,
            None if tail.is_empty() => default_port,
            None => return Err(anyhow::anyhow!("unexpected text after ']': {}", tail)),
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 address has several ':'; only a single one separates a port
    match input.rfind(':') {
        Some(colon) if input.matches(':').count() == 1 => {
            let (h, p_str) = input.split_at(colon);
            let p_str = &p_str[1..];
            if h.is_empty() {
                return Err(anyhow::anyhow!("host is empty"));
            }
            let p: u16 = p_str.parse().map_err(|_| anyhow::anyhow!("invalid port: {}", p_str))?;
            Ok((h.to_string(), p))
        }
        _ => Ok((input.to_string(), default_port)),
    }
}

/// Join a remote directory and an entry name with exactly one '/'.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_with_port() {
        assert_eq!(parse_host_port("files.example.com:2222", 22).unwrap(), ("files.example.com".to_string(), 2222));
    }

    #[test]
    fn host_default_port() {
        assert_eq!(parse_host_port("nas", 22).unwrap(), ("nas".to_string(), 22));
    }

    #[test]
    fn ipv6_forms() {
        assert_eq!(parse_host_port("[::1]:2200", 22).unwrap(), ("::1".to_string(), 2200));
        assert_eq!(parse_host_port("[::1]", 22).unwrap(), ("::1".to_string(), 22));
        assert_eq!(parse_host_port("fe80::1", 22).unwrap(), ("fe80::1".to_string(), 22));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_host_port("", 22).is_err());
        assert!(parse_host_port("host:notaport", 22).is_err());
        assert!(parse_host_port(":22", 22).is_err());
    }

    #[test]
    fn join_remote_single_slash() {
        assert_eq!(join_remote("/data", "a.txt"), "/data/a.txt");
        assert_eq!(join_remote("/data/", "a.txt"), "/data/a.txt");
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
    }
}
