//! Interpreter bootstrap: binds the snippet's symbol table, runs it, saves
//! open figures, renders tabular previews and writes a status record.

use std::{collections::HashMap, fs, io, path::Path};

use serde::Deserialize;

/// Bootstrap passed to the interpreter with `-c`.
///
/// argv: `<scratch_dir> <status_path> <input_files_json> <preview_rows>`;
/// the snippet itself arrives on stdin.
pub const BOOTSTRAP: &str = r#"
import sys, os, io, types as _types, json as _json, traceback as _tb

_scratch, _status_path, _inputs, _rows = sys.argv[1], sys.argv[2], sys.argv[3], int(sys.argv[4])
_dumps = _json.dumps
_source = sys.stdin.read()
sys.stdin = io.StringIO()

def _bind(env, name, loader):
    try:
        env[name] = loader()
    except Exception:
        pass

def _load_plt():
    import matplotlib
    matplotlib.use('Agg')
    import matplotlib.pyplot as plt
    return plt

def _load_datetime():
    from datetime import datetime
    return datetime

_env = {
    '__name__': '__main__',
    'input_files': _types.MappingProxyType(_json.loads(_inputs)),
    'output_dir': _scratch,
}
_bind(_env, 'pd', lambda: __import__('pandas'))
_bind(_env, 'np', lambda: __import__('numpy'))
_bind(_env, 'plt', _load_plt)
_bind(_env, 'datetime', _load_datetime)
_bind(_env, 'json', lambda: _json)
_bind(_env, 're', lambda: __import__('re'))
_bind(_env, 'base64', lambda: __import__('base64'))
_plt = _env.get('plt')
_pd = _env.get('pd')
_join, _listdir, _isfile = os.path.join, os.listdir, os.path.isfile

def _previews():
    out = {}
    for name in sorted(_listdir(_scratch)):
        path = _join(_scratch, name)
        lower = name.lower()
        if not _isfile(path) or not lower.endswith(('.csv', '.xlsx', '.xls')):
            continue
        try:
            name.encode('utf-8')
        except UnicodeEncodeError:
            continue
        if _pd is None:
            out[name] = {'error': 'pandas is not available'}
            continue
        try:
            df = _pd.read_csv(path) if lower.endswith('.csv') else _pd.read_excel(path)
            out[name] = {'html': df.head(_rows).to_html()}
        except Exception as e:
            out[name] = {'error': str(e)}
    return out

_status = {'ok': True}
try:
    exec(compile(_source, '<snippet>', 'exec'), _env)
    if _plt is not None:
        for _n in _plt.get_fignums():
            _fig = _plt.figure(_n)
            _path = _join(_scratch, 'plot_%d.png' % _n)
            _fig.savefig(_path)
            print('[AGENT] Saved plot to %s' % _path)
    sys.stdout.flush()
    _status['previews'] = _previews()
except BaseException as e:
    _status = {'ok': False, 'error': str(e), 'error_type': type(e).__name__, 'traceback': _tb.format_exc()}

with open(_status_path, 'w', encoding='utf-8') as _fh:
    _fh.write(_dumps(_status))
"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessStatus {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
    #[serde(default)]
    pub previews: HashMap<String, Preview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Preview {
    Html { html: String },
    Failed { error: String },
}

impl HarnessStatus {
    /// `Ok(None)` when the interpreter died before writing a record.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Message for a failed run; exceptions with an empty message fall back
    /// to the exception type name.
    pub fn error_message(&self) -> String {
        match (self.error.as_deref(), self.error_type.as_deref()) {
            (Some(msg), _) if !msg.is_empty() => msg.to_string(),
            (_, Some(ty)) => ty.to_string(),
            _ => "snippet raised an exception".to_string(),
        }
    }
}
