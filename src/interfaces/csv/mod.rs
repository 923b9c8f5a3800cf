pub mod ledger_reader;
pub mod ledger_writer;
