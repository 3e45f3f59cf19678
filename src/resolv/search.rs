//! Turning a host name into the list of names to query.

use super::conf::ResolvConf;
use super::error::Error;
use crate::base::name::Dname;
use smallvec::SmallVec;
use std::str::FromStr;

/// The absolute names to try for a host name, in order.
pub type Candidates = SmallVec<[Dname; 4]>;

/// Returns the search candidates for a host name.
///
/// A name ending in a dot is absolute and only tried as is. Otherwise, the
/// names created by appending each domain of the search list are tried.
/// The name itself is tried first if it contains at least `ndots` dots and
/// last otherwise.
pub fn candidates(
    host: &str,
    conf: &ResolvConf,
) -> Result<Candidates, Error> {
    let name = Dname::from_str(host).map_err(|_| Error::BadName)?;
    if name.is_root() {
        return Err(Error::BadName);
    }
    let mut res = Candidates::new();
    if host.ends_with('.')
        || !conf.options.dn_search
        || conf.search.is_empty()
    {
        res.push(name);
        return Ok(res);
    }

    let as_is_first = host.matches('.').count() >= conf.ndots;
    if as_is_first {
        res.push(name.clone());
    }
    for suffix in &conf.search {
        // Names that would become too long are skipped.
        if let Ok(candidate) = name.chain(suffix) {
            if !res.contains(&candidate) {
                res.push(candidate)
            }
        }
    }
    if !as_is_first && !res.contains(&name) {
        res.push(name);
    }
    Ok(res)
}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn conf(ndots: usize, search: &[&str]) -> ResolvConf {
        let mut conf = ResolvConf::new();
        conf.ndots = ndots;
        conf.search = search
            .iter()
            .map(|name| Dname::from_str(name).unwrap())
            .collect();
        conf
    }

    #[rstest]
    #[case("www", 1, &["example.com"], &["www.example.com", "www"])]
    #[case(
        "www.example", 1, &["example.com"],
        &["www.example", "www.example.example.com"]
    )]
    #[case(
        "www.example", 2, &["a.test", "b.test"],
        &["www.example.a.test", "www.example.b.test", "www.example"]
    )]
    #[case("www.example.", 1, &["example.com"], &["www.example"])]
    #[case("host", 0, &["example.com"], &["host", "host.example.com"])]
    #[case("host", 1, &[], &["host"])]
    fn search_order(
        #[case] host: &str,
        #[case] ndots: usize,
        #[case] search: &[&str],
        #[case] expected: &[&str],
    ) {
        let res = candidates(host, &conf(ndots, search)).unwrap();
        let res: Vec<_> = res.iter().map(|name| name.to_string()).collect();
        assert_eq!(res, expected);
    }

    #[test]
    fn search_disabled() {
        let mut conf = conf(1, &["example.com"]);
        conf.options.dn_search = false;
        let res = candidates("www", &conf).unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].to_string(), "www");
    }

    #[test]
    fn bad_names() {
        let conf = conf(1, &[]);
        for host in ["", ".", "a..b", "bad\\"] {
            assert!(
                matches!(candidates(host, &conf), Err(Error::BadName)),
                "{:?}",
                host
            );
        }
    }
}
