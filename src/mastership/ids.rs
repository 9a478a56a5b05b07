//! `requestid`/`grantid` encoding (`spec.md` §4.2 "Identifiers").

use crate::error::{Error, Result};
use crate::fp::Tag;

/// Identifies an in-progress transfer at the destination: a fresh unique
/// id, the time it was generated, and the two repositories involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId {
    pub uid: Tag,
    pub ts: i64,
    pub src_host_port: String,
    pub dst_host_port: String,
}

impl RequestId {
    pub fn new(src_host_port: impl Into<String>, dst_host_port: impl Into<String>, ts: i64) -> Self {
        Self { uid: crate::uniqueid::unique_id(), ts, src_host_port: src_host_port.into(), dst_host_port: dst_host_port.into() }
    }

    pub fn encode(&self) -> String {
        format!("{} {} {} {}", hex_encode(&self.uid), self.ts, self.src_host_port, self.dst_host_port)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(4, ' ');
        let uid = parts.next().ok_or_else(bad)?;
        let ts = parts.next().ok_or_else(bad)?;
        let src = parts.next().ok_or_else(bad)?;
        let dst = parts.next().ok_or_else(bad)?;
        Ok(Self {
            uid: hex_decode(uid)?,
            ts: ts.parse().map_err(|_| bad())?,
            src_host_port: src.to_string(),
            dst_host_port: dst.to_string(),
        })
    }
}

/// One child entry in a `grantid`'s hint list (`spec.md` §4.2 C3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildHint {
    pub arc: String,
    pub hint: String,
    pub ts: i64,
}

/// Identifies an in-progress transfer at the source: the originating
/// `requestid` plus the ceding directory's child hint list (empty for
/// non-directories).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantId {
    pub request: RequestId,
    pub children: Vec<ChildHint>,
}

impl GrantId {
    pub fn encode(&self) -> String {
        let list = self
            .children
            .iter()
            .map(|c| format!("{}/{}/{}", c.arc, c.hint, c.ts))
            .collect::<Vec<_>>()
            .join("/");
        if list.is_empty() {
            self.request.encode()
        } else {
            format!("{} {}", self.request.encode(), list)
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (request_part, list_part) = match s.splitn(5, ' ').collect::<Vec<_>>().as_slice() {
            [uid, ts, src, dst, rest] => (format!("{uid} {ts} {src} {dst}"), Some((*rest).to_string())),
            [uid, ts, src, dst] => (format!("{uid} {ts} {src} {dst}"), None),
            _ => return Err(bad()),
        };
        let request = RequestId::parse(&request_part)?;
        let children = match list_part {
            None => Vec::new(),
            Some(list) => {
                let fields: Vec<&str> = list.split('/').collect();
                if fields.len() % 3 != 0 {
                    return Err(bad());
                }
                fields
                    .chunks(3)
                    .map(|c| Ok(ChildHint { arc: c[0].to_string(), hint: c[1].to_string(), ts: c[2].parse().map_err(|_| bad())? }))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        Ok(Self { request, children })
    }

    /// True if `grant`'s encoded form starts with `requestid`'s, the check
    /// the destination's recovery driver uses to find its own grant among
    /// a source's `#master-grant` values (`spec.md` §4.2 recovery step 2).
    pub fn matches_request(grant: &str, requestid: &str) -> bool {
        grant == requestid || grant.starts_with(&format!("{requestid} "))
    }
}

fn hex_encode(tag: &Tag) -> String {
    tag.to_bytes().iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Tag> {
    if s.len() != Tag::BYTE_LEN * 2 {
        return Err(bad());
    }
    let mut bytes = [0u8; Tag::BYTE_LEN];
    for i in 0..Tag::BYTE_LEN {
        bytes[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| bad())?;
    }
    Ok(Tag::from_bytes(&bytes))
}

fn bad() -> Error {
    Error::InvalidArgs("malformed mastership identifier".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requestid_roundtrips() {
        let r = RequestId::new("src.example.com:1", "dst.example.com:2", 123);
        let encoded = r.encode();
        assert_eq!(RequestId::parse(&encoded).unwrap(), r);
    }

    #[test]
    fn grantid_roundtrips_with_children() {
        let request = RequestId::new("src:1", "dst:2", 42);
        let grant = GrantId {
            request: request.clone(),
            children: vec![ChildHint { arc: "foo".into(), hint: "h1:1".into(), ts: 1 }, ChildHint { arc: "bar".into(), hint: "".into(), ts: 0 }],
        };
        let encoded = grant.encode();
        assert_eq!(GrantId::parse(&encoded).unwrap(), grant);
        assert!(GrantId::matches_request(&encoded, &request.encode()));
    }

    #[test]
    fn grantid_roundtrips_without_children() {
        let request = RequestId::new("src:1", "dst:2", 42);
        let grant = GrantId { request: request.clone(), children: Vec::new() };
        let encoded = grant.encode();
        assert_eq!(encoded, request.encode());
        assert_eq!(GrantId::parse(&encoded).unwrap(), grant);
    }
}
