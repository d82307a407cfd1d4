/// Single-page form served at `/`. Talks to the JSON endpoints with `fetch`.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Patient Profile &amp; Health Recommendations</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; color: #222; }
  h1 { font-size: 1.6rem; }
  section { border: 1px solid #ddd; border-radius: 6px; padding: 1rem; margin-bottom: 1rem; }
  table { width: 100%; border-collapse: collapse; }
  td, th { border-bottom: 1px solid #eee; padding: 0.3rem; text-align: left; }
  td input { width: 100%; box-sizing: border-box; }
  .error { color: #b00020; white-space: pre-wrap; }
  .status { color: #555; font-style: italic; }
  .disclaimer { background: #fff8e1; padding: 0.6rem; border-left: 4px solid #f0b400; }
  pre { white-space: pre-wrap; background: #fafafa; padding: 0.6rem; }
  .hidden { display: none; }
  button { margin-right: 0.4rem; }
</style>
</head>
<body>
<h1>Patient Profile &amp; Health Recommendations</h1>

<section id="upload-section">
  <h2>1. Upload medical documents</h2>
  <p>Supported formats: PDF, PNG, JPG, JPEG, TIFF, BMP.</p>
  <form id="upload-form">
    <input type="file" id="files" name="files" multiple accept=".pdf,.png,.jpg,.jpeg,.tif,.tiff,.bmp">
    <button type="submit">Process documents</button>
  </form>
  <ul id="document-list"></ul>
</section>

<p id="status" class="status"></p>
<p id="error" class="error"></p>

<section id="profile-section" class="hidden">
  <h2>2. Review patient profile</h2>
  <table>
    <thead><tr><th>Field</th><th>Value</th><th></th></tr></thead>
    <tbody id="profile-rows"></tbody>
  </table>
  <p>
    <button id="add-field">Add field</button>
    <button id="save-profile">Save profile</button>
    <a id="export-json" href="#">Download JSON</a> |
    <a id="export-md" href="#">Download Markdown</a>
  </p>
</section>

<section id="advice-section" class="hidden">
  <h2>3. Health recommendations</h2>
  <p>
    <button id="generate-advice">Generate recommendations</button>
    <a id="export-advice" class="hidden" href="#">Download recommendations</a>
  </p>
  <div id="quick-tips"></div>
  <pre id="advice-text"></pre>
</section>

<p class="disclaimer" id="disclaimer"></p>
<button id="clear-session" class="hidden">Clear profile</button>

<script>
let sessionId = null;

const $ = (id) => document.getElementById(id);

function showError(message) {
  $("error").textContent = message || "";
}

function showStatus(message) {
  $("status").textContent = message || "";
}

async function call(method, path, body) {
  const options = { method, headers: {} };
  if (body instanceof FormData) {
    options.body = body;
  } else if (body !== undefined) {
    options.headers["Content-Type"] = "application/json";
    options.body = JSON.stringify(body);
  }
  const response = await fetch(path, options);
  if (response.status === 204) {
    return null;
  }
  const data = await response.json().catch(() => ({}));
  if (!response.ok) {
    if (data.session_id) {
      sessionId = data.session_id;
    }
    throw new Error((data.error || response.statusText) + (data.details ? "\n" + data.details : ""));
  }
  return data;
}

function addRow(key, value) {
  const row = document.createElement("tr");
  row.innerHTML = '<td><input class="key"></td><td><input class="value"></td><td><button>Remove</button></td>';
  row.querySelector(".key").value = key;
  row.querySelector(".value").value = value;
  row.querySelector("button").onclick = () => row.remove();
  $("profile-rows").appendChild(row);
}

function render(session) {
  sessionId = session.session_id;
  $("disclaimer").textContent = session.disclaimer;
  $("clear-session").classList.remove("hidden");
  showStatus(session.status_message);
  showError(session.error);

  $("document-list").innerHTML = "";
  for (const doc of session.documents) {
    const item = document.createElement("li");
    item.textContent = `${doc.file_name} (${doc.kind}, ${doc.size_kb.toFixed(1)} KB)`;
    $("document-list").appendChild(item);
  }

  const profile = session.profile;
  $("profile-section").classList.toggle("hidden", !profile);
  $("advice-section").classList.toggle("hidden", !profile);
  if (profile) {
    $("profile-rows").innerHTML = "";
    for (const [key, value] of Object.entries(profile.fields)) {
      addRow(key, value);
    }
    $("export-json").href = `/sessions/${sessionId}/export/profile?format=json`;
    $("export-md").href = `/sessions/${sessionId}/export/profile?format=markdown`;
  }

  const advice = session.advice;
  $("generate-advice").textContent = advice ? "Regenerate recommendations" : "Generate recommendations";
  $("export-advice").classList.toggle("hidden", !advice);
  $("advice-text").textContent = advice ? advice.text : "";
  $("quick-tips").innerHTML = "";
  if (advice) {
    $("export-advice").href = `/sessions/${sessionId}/export/advice`;
    if (advice.quick_tips.length > 0) {
      const title = document.createElement("h3");
      title.textContent = "Quick tips";
      const list = document.createElement("ul");
      for (const tip of advice.quick_tips) {
        const item = document.createElement("li");
        item.textContent = tip;
        list.appendChild(item);
      }
      $("quick-tips").append(title, list);
    }
  }
}

async function refresh() {
  if (sessionId) {
    render(await call("GET", `/sessions/${sessionId}`));
  }
}

$("upload-form").onsubmit = async (event) => {
  event.preventDefault();
  const files = $("files").files;
  if (files.length === 0) {
    showError("Choose at least one document.");
    return;
  }
  const form = new FormData();
  for (const file of files) {
    form.append("files", file);
  }
  showError("");
  showStatus("Processing documents...");
  try {
    render(await call("POST", "/sessions", form));
  } catch (e) {
    showError(e.message);
    await refresh().catch(() => {});
  }
};

$("add-field").onclick = () => addRow("", "");

$("save-profile").onclick = async () => {
  const fields = {};
  for (const row of $("profile-rows").querySelectorAll("tr")) {
    const key = row.querySelector(".key").value.trim();
    const value = row.querySelector(".value").value.trim();
    if (key && value) {
      fields[key] = value;
    }
  }
  try {
    render(await call("PUT", `/sessions/${sessionId}/profile`, { fields }));
  } catch (e) {
    showError(e.message);
  }
};

$("generate-advice").onclick = async () => {
  showStatus("Generating recommendations...");
  try {
    render(await call("POST", `/sessions/${sessionId}/advice`));
  } catch (e) {
    showError(e.message);
    await refresh().catch(() => {});
  }
};

$("clear-session").onclick = async () => {
  try {
    await call("DELETE", `/sessions/${sessionId}`);
  } catch (e) {
    showError(e.message);
  }
  sessionId = null;
  location.reload();
};
</script>
</body>
</html>
"##;
