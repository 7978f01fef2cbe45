pub(crate) mod caller_identity;
