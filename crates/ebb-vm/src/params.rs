//! Callback parameter marshalling
//!
//! The argument view handed to a native callback. Slot 0 is the result; the
//! arguments occupy slots 1 through `count()`. Typed getters resolve pool
//! and heap references through the calling runner; typed setters write the
//! result slot, allocating run-scoped values as needed.

use crate::runner::{resolve_cidr, resolve_ip, resolve_str, Runner};
use crate::value::{Ref, Slot};
use ebb_core::Cidr;
use std::net::IpAddr;

/// The arguments of one native call.
pub struct Params<'r, 'a> {
    caller: &'r mut Runner<'a>,
    argc: usize,
    argv: Vec<Slot>,
}

impl<'r, 'a> Params<'r, 'a> {
    pub(crate) fn new(caller: &'r mut Runner<'a>, argc: usize, argv: Vec<Slot>) -> Self {
        debug_assert_eq!(argv.len(), argc + 1);
        Self { caller, argc, argv }
    }

    /// The runner executing this call; used by callbacks to suspend or to
    /// allocate run-scoped values.
    pub fn caller(&mut self) -> &mut Runner<'a> {
        &mut *self.caller
    }

    pub fn count(&self) -> usize {
        self.argc
    }

    /// Raw slot access; index 0 is the result slot.
    pub fn at(&self, index: usize) -> Slot {
        self.argv[index]
    }

    /// The argument slots, without the result slot.
    pub fn args(&self) -> &[Slot] {
        &self.argv[1..]
    }

    pub(crate) fn result(&self) -> Slot {
        self.argv[0]
    }

    // ----- result setters -----

    pub fn set_result_bool(&mut self, value: bool) {
        self.argv[0] = Slot::Int(value as i64);
    }

    pub fn set_result_int(&mut self, value: i64) {
        self.argv[0] = Slot::Int(value);
    }

    pub fn set_result_string(&mut self, value: impl Into<String>) {
        let r = self.caller.new_string(value.into());
        self.argv[0] = Slot::Str(r);
    }

    /// Returns an already-allocated string without copying.
    pub fn set_result_str_ref(&mut self, value: Ref) {
        self.argv[0] = Slot::Str(value);
    }

    pub fn set_result_ip(&mut self, value: IpAddr) {
        let r = self.caller.heap.new_ip(value);
        self.argv[0] = Slot::Ip(r);
    }

    pub fn set_result_cidr(&mut self, value: Cidr) {
        let r = self.caller.heap.new_cidr(value);
        self.argv[0] = Slot::Cidr(r);
    }

    /// Returns a handler reference by its program index.
    pub fn set_result_handler(&mut self, handler_index: usize) {
        self.argv[0] = Slot::Int(handler_index as i64);
    }

    // ----- typed getters -----

    pub fn get_bool(&self, index: usize) -> bool {
        self.argv[index].truthy()
    }

    pub fn get_int(&self, index: usize) -> i64 {
        self.argv[index].as_int()
    }

    pub fn get_string(&self, index: usize) -> &str {
        resolve_str(
            self.caller.program.constants(),
            &self.caller.heap,
            self.argv[index].as_str_ref(),
        )
    }

    pub fn get_ip(&self, index: usize) -> &IpAddr {
        resolve_ip(
            self.caller.program.constants(),
            &self.caller.heap,
            self.argv[index].as_ip_ref(),
        )
    }

    pub fn get_cidr(&self, index: usize) -> &Cidr {
        resolve_cidr(
            self.caller.program.constants(),
            &self.caller.heap,
            self.argv[index].as_cidr_ref(),
        )
    }

    /// The handler index carried by a handler-reference argument.
    pub fn get_handler(&self, index: usize) -> usize {
        self.argv[index].as_int() as usize
    }

    pub fn get_int_array(&self, index: usize) -> &[i64] {
        match self.argv[index] {
            Slot::IntArray(id) => self.caller.program.constants().int_array(id as usize),
            other => panic!("expected an integer array argument, found {other:?}"),
        }
    }

    pub fn get_string_array(&self, index: usize) -> &[String] {
        match self.argv[index] {
            Slot::StrArray(id) => self.caller.program.constants().string_array(id as usize),
            other => panic!("expected a string array argument, found {other:?}"),
        }
    }

    pub fn get_ip_array(&self, index: usize) -> &[IpAddr] {
        match self.argv[index] {
            Slot::IpArray(id) => self.caller.program.constants().ipaddr_array(id as usize),
            other => panic!("expected an IP-address array argument, found {other:?}"),
        }
    }

    pub fn get_cidr_array(&self, index: usize) -> &[Cidr] {
        match self.argv[index] {
            Slot::CidrArray(id) => self.caller.program.constants().cidr_array(id as usize),
            other => panic!("expected a CIDR array argument, found {other:?}"),
        }
    }
}
