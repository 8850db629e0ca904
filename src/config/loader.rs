// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Dotenv file loading.

use anyhow::{Context, Result};
use std::path::Path;

/// Load variables from a dotenv file into the process environment.
///
/// Variables already present in the environment keep their values. A
/// missing file is not an error; `Ok(false)` is returned instead.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            tracing::debug!("Loaded environment from {:?}", path);
            Ok(true)
        }
        Err(e) if e.not_found() => {
            tracing::debug!("Env file not found at {:?}, using environment only", path);
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to load env file at {}. Check that each line is KEY=VALUE.",
                path.display()
            )
        }),
    }
}

