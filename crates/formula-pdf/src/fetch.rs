//! Object resolution on top of the cross-reference index.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::object::{ObjRef, Object};
use crate::object_stream::ObjectStream;
use crate::parser::{Parser, Resolver};
use crate::xref::{Xref, XrefEntry};

impl Xref {
    /// Resolve object `num` with generation `gen`.
    ///
    /// Anything that cannot be resolved (free or unknown numbers, damaged bodies, recursion past
    /// the depth cap) comes back as [`Object::Null`], which is what a dangling reference means in
    /// the file format. Use [`Xref::try_fetch`] to see why.
    pub fn fetch(&mut self, num: u32, gen: u16) -> Object {
        match self.try_fetch(num, gen, 0) {
            Ok(Some(obj)) => obj,
            Ok(None) => Object::Null,
            Err(err) => {
                log::warn!("failed to resolve object {num} {gen}: {err}");
                Object::Null
            }
        }
    }

    pub fn fetch_ref(&mut self, r: ObjRef) -> Object {
        self.fetch(r.num, r.gen)
    }

    /// Follow `obj` if it is a reference; other objects are returned as is.
    pub fn resolve(&mut self, obj: &Object) -> Object {
        match obj {
            Object::Reference(r) => self.fetch_ref(*r),
            other => other.clone(),
        }
    }

    /// Resolve an object, reporting damage instead of hiding it.
    ///
    /// `Ok(None)` means the index has no live object under that number and generation. `depth`
    /// counts nested resolutions and is 0 for a top-level call.
    pub fn try_fetch(&mut self, num: u32, gen: u16, depth: usize) -> Result<Option<Object>> {
        if depth > self.options.max_fetch_depth {
            return Err(Error::RecursionLimit {
                depth: self.options.max_fetch_depth,
            });
        }

        match self.table.get(num as usize) {
            None | Some(XrefEntry::Free { .. }) => Ok(None),
            Some(XrefEntry::Direct { offset, generation }) => {
                if generation != gen {
                    log::debug!("object {num} has generation {generation}, not {gen}");
                    return Ok(None);
                }
                self.fetch_direct(ObjRef::new(num, gen), offset, depth)
                    .map(Some)
            }
            Some(XrefEntry::Grouped { host, slot }) => {
                if gen != 0 {
                    return Ok(None);
                }
                self.fetch_grouped(num, host, slot, depth)
            }
        }
    }

    fn fetch_direct(&mut self, r: ObjRef, offset: usize, depth: usize) -> Result<Object> {
        if offset >= self.data.len() {
            return Err(Error::damaged(
                offset,
                format!("object {r} offset is past the end of the file"),
            ));
        }
        let data = Arc::clone(&self.data);
        let decrypt_as = (self.security.params.is_some() && self.decryptor.is_some()).then_some(r);
        Parser::new(&data, offset, self)
            .with_depth(depth)
            .with_decryption(decrypt_as)
            .parse_indirect_object(r)
    }

    fn fetch_grouped(
        &mut self,
        num: u32,
        host: u32,
        slot: u32,
        depth: usize,
    ) -> Result<Option<Object>> {
        if let Some(stream) = self.object_streams.get(host) {
            return Ok(stream.member(slot, num).cloned());
        }

        // Object streams cannot nest.
        let Some(XrefEntry::Direct { offset, generation }) = self.table.get(host as usize) else {
            return Err(Error::damaged(
                0,
                format!("object stream {host} holding object {num} is not a direct object"),
            ));
        };
        let host_ref = ObjRef::new(host, generation);
        let Object::Stream(stream) = self.fetch_direct(host_ref, offset, depth.saturating_add(1))?
        else {
            return Err(Error::damaged(
                offset,
                format!("object stream {host_ref} is not a stream"),
            ));
        };
        let parsed = ObjectStream::parse(
            host,
            &stream,
            self.options.max_object_stream_members,
            self.options.max_decoded_stream_bytes,
        )?;
        let member = parsed.member(slot, num).cloned();
        self.object_streams.insert(parsed);
        Ok(member)
    }
}

impl Resolver for Xref {
    fn resolve_length(&mut self, r: ObjRef, depth: usize) -> Option<i64> {
        match self.try_fetch(r.num, r.gen, depth.saturating_add(1)) {
            Ok(Some(Object::Integer(len))) => Some(len),
            Ok(_) => None,
            Err(err) => {
                log::debug!("stream length {r} did not resolve: {err}");
                None
            }
        }
    }

    fn stream_end_fallback(&self, stream_start: usize) -> Option<usize> {
        Xref::stream_end_fallback(self, stream_start)
    }

    fn decrypt(&self, obj: ObjRef, data: &mut Vec<u8>) {
        if let (Some(params), Some(decryptor)) = (&self.security.params, &self.decryptor) {
            decryptor.decrypt(params, obj, data);
        }
    }
}
