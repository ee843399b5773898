#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use depdag::cache::open_store;
use depdag::config::load_and_validate;
use depdag::dependency::ConfigResolver;
use depdag::engine::{Manager, RenderOutput};
use depdag::fs::{FileSystem, RealFileSystem};
use depdag::exec::ActionBackend;
use depdag_test_utils::{init_tracing, RecordingHooks, Workspace};

/// In-memory render sink that tests can read back.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn output(&self) -> RenderOutput {
        Arc::new(Mutex::new(Box::new(self.clone())))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Build a manager for the project at `<workspace>/<root>`.
pub fn manager(
    ws: &Workspace,
    root: &str,
    backend: Arc<dyn ActionBackend>,
    hooks: &RecordingHooks,
    allow_cyclic: bool,
) -> Manager {
    init_tracing();

    let root_dir = ws.path().join(root);
    let config = Arc::new(load_and_validate(ws.config_path(root)).expect("valid root config"));
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let cache = open_store(config.config.hash_storage_mode, &root_dir, Arc::clone(&fs));
    let resolver =
        ConfigResolver::new(&root_dir, Arc::clone(&config), fs, cache).allow_cyclic(allow_cyclic);

    Manager::new(config, Arc::new(resolver), backend).with_hooks(Arc::new(hooks.clone()))
}
