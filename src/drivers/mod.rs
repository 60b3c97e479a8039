mod mysql;

pub use self::in_memory_test::{
    InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedCall, RecordedQuery,
};
pub use self::mysql::MysqlDriver;
