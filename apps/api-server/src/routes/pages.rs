use history_db::CaptionRecord;

const STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem}\
table{border-collapse:collapse;width:100%}\
td,th{border:1px solid #ddd;padding:.4rem;text-align:left}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
<style>{STYLE}</style>\n</head>\n<body>\n<nav><a href=\"/\">Upload</a> | <a href=\"/history\">History</a></nav>\n\
{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn index_page(model_names: &[&str], default_model: &str) -> String {
    let options = model_names
        .iter()
        .map(|name| {
            let selected = if *name == default_model { " selected" } else { "" };
            format!(
                "<option value=\"{0}\"{1}>{0}</option>",
                escape_html(name),
                selected
            )
        })
        .collect::<Vec<_>>()
        .join("");

    let body = format!(
        "<h1>Image captioning</h1>\n\
<form action=\"/upload-image\" method=\"post\" enctype=\"multipart/form-data\" id=\"upload\">\n\
<input type=\"file\" name=\"file\" accept=\"image/*\" required>\n\
<select name=\"model_name\">{options}</select>\n\
<input type=\"number\" name=\"length\" value=\"20\" min=\"1\">\n\
<button type=\"submit\">Describe</button>\n\
</form>\n<p id=\"result\"></p>\n\
<script>\n\
document.getElementById('upload').addEventListener('submit', async (e) => {{\n\
  e.preventDefault();\n\
  const form = e.target;\n\
  const query = new URLSearchParams({{model_name: form.model_name.value, length: form.elements['length'].value}});\n\
  const data = new FormData();\n\
  data.append('file', form.file.files[0]);\n\
  const res = await fetch('/upload-image?' + query, {{method: 'POST', body: data}});\n\
  const json = await res.json();\n\
  document.getElementById('result').textContent = json.description ?? json.detail;\n\
}});\n\
</script>"
    );

    layout("Image captioning", &body)
}

pub fn history_page(records: &[CaptionRecord]) -> String {
    let rows = records
        .iter()
        .map(|record| {
            format!(
                "<tr><td>{}</td><td>{}</td></tr>",
                record.id,
                escape_html(&record.description)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let body = format!(
        "<h1>History</h1>\n<table>\n<tr><th>ID</th><th>Description</th></tr>\n{}\n</table>",
        rows
    );

    layout("History", &body)
}
