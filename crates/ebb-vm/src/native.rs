//! Native callbacks
//!
//! A native callback is host code exposed to compiled programs through a
//! typed signature. Handlers return the boolean "handled?" flag; functions
//! return their declared type. Callbacks optionally carry an IR-level
//! verifier that runs over every call site before code generation, and
//! frontend metadata (parameter names with optional defaults) for
//! named-argument resolution.

use crate::error::NativeError;
use crate::params::Params;
use ebb_core::{Attribute, AttributeSet, Cidr, LiteralType, RegExp, Signature};
use ebb_ir::{IrBuilder, ValueId};
use std::net::IpAddr;
use std::sync::Arc;

/// The invocation entry point of a callback.
pub type NativeFn = Box<dyn Fn(&mut Params<'_, '_>) -> Result<(), NativeError>>;

/// IR-level verifier: may inspect or rewrite the call instruction through
/// the builder; returning `false` fails compilation.
pub type VerifyFn = Box<dyn Fn(ValueId, &mut IrBuilder) -> bool>;

/// A default value for a named parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Boolean(bool),
    Number(i64),
    String(String),
    IpAddress(IpAddr),
    Cidr(Cidr),
    RegExp(RegExp),
}

/// One host-supplied callable.
pub struct NativeCallback {
    is_handler: bool,
    signature: Signature,
    attributes: AttributeSet,
    verifier: Option<VerifyFn>,
    function: Option<NativeFn>,
    param_names: Vec<String>,
    param_defaults: Vec<Option<DefaultValue>>,
}

impl std::fmt::Debug for NativeCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCallback")
            .field("signature", &self.signature.encode())
            .field("is_handler", &self.is_handler)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl NativeCallback {
    /// A handler callback; its return type is always Boolean.
    pub fn handler(name: impl Into<String>) -> Self {
        let mut signature = Signature::new(name);
        signature.set_return_type(LiteralType::Boolean);
        Self {
            is_handler: true,
            signature,
            attributes: AttributeSet::empty(),
            verifier: None,
            function: None,
            param_names: Vec::new(),
            param_defaults: Vec::new(),
        }
    }

    /// A function callback with the given return type.
    pub fn function(name: impl Into<String>, return_type: LiteralType) -> Self {
        let mut signature = Signature::new(name);
        signature.set_return_type(return_type);
        Self {
            is_handler: false,
            signature,
            attributes: AttributeSet::empty(),
            verifier: None,
            function: None,
            param_names: Vec::new(),
            param_defaults: Vec::new(),
        }
    }

    pub fn is_handler(&self) -> bool {
        self.is_handler
    }

    pub fn is_function(&self) -> bool {
        !self.is_handler
    }

    pub fn name(&self) -> &str {
        self.signature.name()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn attributes(&self) -> AttributeSet {
        self.attributes
    }

    // ----- signature builder -----

    pub fn returns(&mut self, ty: LiteralType) -> &mut Self {
        self.signature.set_return_type(ty);
        self
    }

    /// Declares a named parameter without a default.
    pub fn param(&mut self, name: impl Into<String>, ty: LiteralType) -> &mut Self {
        self.signature.push_arg(ty);
        self.param_names.push(name.into());
        self.param_defaults.push(None);
        self
    }

    /// Declares a named parameter with a default value.
    pub fn param_default(
        &mut self,
        name: impl Into<String>,
        ty: LiteralType,
        default: DefaultValue,
    ) -> &mut Self {
        self.signature.push_arg(ty);
        self.param_names.push(name.into());
        self.param_defaults.push(Some(default));
        self
    }

    /// Declares the ordered parameter types wholesale, without names.
    pub fn params(&mut self, types: &[LiteralType]) -> &mut Self {
        self.signature.set_args(types.to_vec());
        self
    }

    // ----- semantic verifier -----

    pub fn verifier(
        &mut self,
        verify: impl Fn(ValueId, &mut IrBuilder) -> bool + 'static,
    ) -> &mut Self {
        self.verifier = Some(Box::new(verify));
        self
    }

    /// Runs the verifier over one call site; callbacks without a verifier
    /// always pass.
    pub fn verify(&self, call: ValueId, builder: &mut IrBuilder) -> bool {
        match &self.verifier {
            Some(verify) => verify(call, builder),
            None => true,
        }
    }

    // ----- binding -----

    pub fn bind(
        &mut self,
        function: impl Fn(&mut Params<'_, '_>) -> Result<(), NativeError> + 'static,
    ) -> &mut Self {
        self.function = Some(Box::new(function));
        self
    }

    pub fn invoke(&self, params: &mut Params<'_, '_>) -> Result<(), NativeError> {
        match &self.function {
            Some(function) => function(params),
            None => Err(NativeError::new(format!(
                "native callback {} is not bound",
                self.signature.encode()
            ))),
        }
    }

    // ----- named parameters -----

    pub fn parameters_named(&self) -> bool {
        !self.param_names.is_empty()
    }

    pub fn param_name_at(&self, index: usize) -> &str {
        &self.param_names[index]
    }

    pub fn default_param_at(&self, index: usize) -> Option<&DefaultValue> {
        self.param_defaults[index].as_ref()
    }

    pub fn find_param_by_name(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    // ----- attributes -----

    pub fn set_no_return(&mut self) -> &mut Self {
        self.attributes.insert(Attribute::NoReturn);
        self
    }

    pub fn set_read_only(&mut self) -> &mut Self {
        self.attributes.insert(Attribute::SideEffectFree);
        self
    }

    pub fn set_experimental(&mut self) -> &mut Self {
        self.attributes.insert(Attribute::Experimental);
        self
    }

    pub fn is_never_returning(&self) -> bool {
        self.attributes.contains(Attribute::NoReturn)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(Attribute::SideEffectFree)
    }

    pub fn is_experimental(&self) -> bool {
        self.attributes.contains(Attribute::Experimental)
    }
}

/// The host's callback table, keyed by canonical signature.
#[derive(Debug, Default)]
pub struct NativeCallbacks {
    callbacks: Vec<Arc<NativeCallback>>,
}

impl NativeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler callback and returns it for builder-style
    /// configuration.
    pub fn register_handler(&mut self, name: &str) -> &mut NativeCallback {
        self.callbacks.push(Arc::new(NativeCallback::handler(name)));
        self.last_registered()
    }

    /// Registers a function callback with the given return type.
    pub fn register_function(&mut self, name: &str, return_type: LiteralType) -> &mut NativeCallback {
        self.callbacks
            .push(Arc::new(NativeCallback::function(name, return_type)));
        self.last_registered()
    }

    fn last_registered(&mut self) -> &mut NativeCallback {
        // the Arc was created just now and has not been shared yet
        Arc::get_mut(self.callbacks.last_mut().expect("callback just pushed"))
            .expect("freshly registered callback is exclusively owned")
    }

    /// Looks a callback up by its canonical signature string.
    pub fn find(&self, signature: &str) -> Option<Arc<NativeCallback>> {
        self.callbacks
            .iter()
            .find(|cb| cb.signature().encode() == signature)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NativeCallback>> {
        self.callbacks.iter()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
