// Copyright 2025 eraflo
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

//! Ordered plugin collection shared by services and runtimes.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Installed plugins, kept in install order.
///
/// Init hooks are run front to back and shut hooks back to front, so a plugin
/// can rely on everything installed before it during its whole lifetime.
pub struct PluginBundle<P: ?Sized> {
    plugins: Vec<(String, Arc<P>)>,
}

impl<P: ?Sized> Default for PluginBundle<P> {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }
}

impl<P: ?Sized> Clone for PluginBundle<P> {
    fn clone(&self) -> Self {
        Self {
            plugins: self.plugins.clone(),
        }
    }
}

impl<P: ?Sized> PluginBundle<P> {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a plugin under `name`.
    ///
    /// ## Returns
    /// An argument error if the name is empty or already taken.
    pub fn install(&mut self, name: impl Into<String>, plugin: Arc<P>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("plugin name is empty"));
        }
        if self.get(&name).is_some() {
            return Err(Error::invalid_argument(format!(
                "plugin '{name}' is already installed"
            )));
        }
        self.plugins.push((name, plugin));
        Ok(())
    }

    /// Builder form of [`PluginBundle::install`].
    pub fn with(mut self, name: impl Into<String>, plugin: Arc<P>) -> Result<Self> {
        self.install(name, plugin)?;
        Ok(self)
    }

    /// Removes a plugin.
    pub fn uninstall(&mut self, name: &str) -> Option<Arc<P>> {
        let at = self.plugins.iter().position(|(n, _)| n == name)?;
        Some(self.plugins.remove(at).1)
    }

    /// Looks a plugin up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<P>> {
        self.plugins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, plugin)| plugin)
    }

    /// Iterates in install order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &Arc<P>)> {
        self.plugins.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Number of installed plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl<P: ?Sized> fmt::Debug for PluginBundle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|(n, _)| n))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn tag(&self) -> u8;
    }

    struct Tagged(u8);

    impl Named for Tagged {
        fn tag(&self) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_install_keeps_order_and_rejects_duplicates() {
        let mut bundle: PluginBundle<dyn Named> = PluginBundle::new();
        bundle.install("a", Arc::new(Tagged(1))).unwrap();
        bundle.install("b", Arc::new(Tagged(2))).unwrap();
        assert!(bundle.install("a", Arc::new(Tagged(3))).is_err());
        assert!(bundle.install("", Arc::new(Tagged(3))).is_err());

        let forward: Vec<u8> = bundle.iter().map(|(_, p)| p.tag()).collect();
        let backward: Vec<u8> = bundle.iter().rev().map(|(_, p)| p.tag()).collect();
        assert_eq!(forward, vec![1, 2]);
        assert_eq!(backward, vec![2, 1]);
    }

    #[test]
    fn test_uninstall_and_lookup() {
        let mut bundle: PluginBundle<dyn Named> = PluginBundle::<dyn Named>::new()
            .with("a", Arc::new(Tagged(1)))
            .unwrap();
        assert_eq!(bundle.get("a").map(|p| p.tag()), Some(1));
        assert!(bundle.uninstall("a").is_some());
        assert!(bundle.uninstall("a").is_none());
        assert!(bundle.is_empty());
    }
}
