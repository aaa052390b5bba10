mod load_retry_test;
mod session_test;
