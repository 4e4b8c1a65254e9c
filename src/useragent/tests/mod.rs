mod common;
mod test_reconnect;
