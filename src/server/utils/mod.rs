pub mod response_utils;
