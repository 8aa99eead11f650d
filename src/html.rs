//! Embedded dashboard page.
//!
//! Leaflet draws the overlay served by `/api/view`; every control posts a
//! command back to the server and redraws from the response.

pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>District Dashboard</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<style>
  body { margin: 0; font-family: sans-serif; }
  #controls { padding: 8px; display: flex; gap: 8px; align-items: center; }
  #map { height: calc(100vh - 60px); }
  #floating-table-container { display: none; position: absolute; top: 80px; right: 20px; z-index: 1000;
    background: white; box-shadow: 0 2px 8px rgba(0,0,0,.3); max-height: 60vh; overflow: auto; }
  #table-header { cursor: move; background: #34495e; color: white; padding: 6px; display: flex; justify-content: space-between; }
  #districtTable td, #districtTable th { padding: 4px 8px; }
  #districtTable tbody tr { cursor: pointer; }
</style>
</head>
<body>
<div id="controls">
  <select id="districtSelect" multiple size="3"></select>
  <select id="fieldSelect"></select>
  <button id="refreshBtn">Refresh</button>
  <button id="viewTableBtn">View table</button>
  <span id="last-update"></span>
</div>
<div id="map"></div>
<div id="floating-table-container">
  <div id="table-header"><span>Districts</span><button id="closeTableBtn">x</button></div>
  <table id="districtTable">
    <thead><tr><th>District</th><th>Temperature</th><th>Population</th><th>Births</th><th>Deaths</th></tr></thead>
    <tbody></tbody>
  </table>
</div>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script src="https://code.jquery.com/jquery-3.7.1.min.js"></script>
<script src="https://code.jquery.com/ui/1.13.2/jquery-ui.min.js"></script>
<script>
const map = L.map('map');
let overlay;

async function post(path, body) {
  const res = await fetch(path, { method: 'POST', headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body || {}) });
  return res.json();
}

function applyView(view) {
  if (overlay) map.removeLayer(overlay);
  overlay = L.geoJSON(view.overlay, {
    style: f => f.properties.style,
    onEachFeature: (feature, layer) => {
      const name = feature.properties.district;
      layer.on('mouseover', async () => {
        const hover = await post('/api/pointer', { district: name, entered: true });
        if (hover.tooltip) layer.bindTooltip(hover.tooltip, { sticky: true }).openTooltip();
        const shape = hover.overlay.features.find(f => f.properties.district === name);
        if (shape) layer.setStyle(shape.properties.style);
      });
      layer.on('mouseout', () => {
        overlay.resetStyle(layer);
        post('/api/pointer', { district: name, entered: false });
      });
      if (feature.properties.popup) {
        layer.bindPopup(feature.properties.popup);
        setTimeout(() => layer.openPopup(), 0);
      }
    }
  }).addTo(map);

  if (view.viewport_changed) {
    const vp = view.viewport;
    if (vp.kind === 'overview') map.setView(vp.center, vp.zoom);
    else map.fitBounds([vp.southWest, vp.northEast], { padding: vp.padding });
  }
  if (view.last_sync) document.getElementById('last-update').innerText = view.last_sync;
}

async function loadTable() {
  const table = await (await fetch('/api/table')).json();
  const tbody = document.querySelector('#districtTable tbody');
  tbody.innerHTML = '';
  table.rows.forEach(row => {
    const tr = document.createElement('tr');
    [row.district, row.temperature, row.population, row.births, row.deaths].forEach(v => {
      const td = document.createElement('td'); td.textContent = v; tr.appendChild(td);
    });
    tr.onclick = async () => applyView(await post('/api/select', { district: row.district }));
    tbody.appendChild(tr);
  });
}

async function init() {
  const options = await (await fetch('/api/options')).json();
  L.tileLayer(options.tile_url).addTo(map);
  const districtSelect = document.getElementById('districtSelect');
  options.districts.forEach(n => districtSelect.add(new Option(n, n)));
  const fieldSelect = document.getElementById('fieldSelect');
  options.fields.forEach(f => fieldSelect.add(new Option(f, f)));

  districtSelect.onchange = async function () {
    const selected = Array.from(this.selectedOptions).map(o => o.value);
    applyView(await post('/api/filter', { selected }));
  };
  fieldSelect.onchange = async function () { applyView(await post('/api/field', { field: this.value })); };
  document.getElementById('refreshBtn').onclick = async () => { applyView(await post('/api/refresh')); loadTable(); };
  document.getElementById('viewTableBtn').onclick = () => { post('/api/table', { visible: true }); $('#floating-table-container').fadeIn(); };
  document.getElementById('closeTableBtn').onclick = () => { post('/api/table', { visible: false }); $('#floating-table-container').fadeOut(); };
  $('#floating-table-container').draggable({ handle: '#table-header' });

  const view = await (await fetch('/api/view')).json();
  applyView(view);
  loadTable();
  if (!view.last_sync) setTimeout(retrySync, 5000);
}

async function retrySync() {
  const view = await post('/api/refresh');
  applyView(view);
  loadTable();
  if (!view.last_sync) setTimeout(retrySync, 5000);
}

init();
</script>
</body>
</html>
"##;
