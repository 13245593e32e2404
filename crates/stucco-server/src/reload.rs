//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the websocket endpoint.
pub const RELOAD_WS_PATH: &str = "/__stucco/ws";

/// Path of the client script.
pub const RELOAD_SCRIPT_PATH: &str = "/__stucco/reload.js";

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Stylesheets changed; refresh them without reloading the page
    Css,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side reload script served at [`RELOAD_SCRIPT_PATH`].
pub fn reload_client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var ws = new WebSocket(protocol + location.host + '{ws_path}');

  function refreshStyles() {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function(link) {{
      var href = link.href.replace(/([?&])__stucco=\d+&?/, '$1').replace(/[?&]$/, '');
      link.href = href + (href.indexOf('?') === -1 ? '?' : '&') + '__stucco=' + Date.now();
    }});
  }}

  ws.onmessage = function(event) {{
    var msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;
      case 'css':
        refreshStyles();
        break;
      case 'connected':
        console.log('[stucco] Connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[stucco] Disconnected, retrying...');
    setTimeout(function() {{ location.reload(); }}, 1000);
  }};
}})();
"#,
        ws_path = RELOAD_WS_PATH
    )
}
