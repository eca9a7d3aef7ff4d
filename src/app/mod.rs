pub(crate) mod command_dispatcher;
pub(crate) mod exit_handler;
pub(crate) mod runtime;
pub(crate) mod terminal;
