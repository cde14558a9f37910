//! Command assembly and signing.
//!
//! A call is rendered to code text (`code`), wrapped with chain metadata
//! (`meta`) into a command envelope whose canonical JSON is hashed once
//! and signed by every key pair (`exec`).

pub mod code;
pub mod exec;
pub mod meta;

pub use code::{assemble_code, CodeArg, CodeBuilder};
pub use exec::{
    attach_sig, missing_signatures, mk_public_send, mk_signer, mk_single_cmd, prepare_exec_cmd,
    simple_exec_cmd, Capability, Command, ExecOptions, KeyPair, SendRequest, Sig, SignatureEntry,
    SignedCommand, Signer,
};
pub use meta::{build_meta, Meta, DEFAULT_TTL};
