use super::test_helpers::*;
use super::*;
use crate::config::SettingsUpdate;
use crate::error::Error;
use crate::types::{ChangeableParams, Event, StatusCode, TaskId};
use std::time::Duration;


/// MD5 of "abc"
const MD5_ABC: &str = "900150983cd24fb0d6963f7d28e17f72";
