//! 内嵌 HTML 页面

/// 生成查看器页面
pub fn viewer_page(port: u16) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>camp</title>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            background: #1a1a2e;
            color: #eee;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            min-height: 100vh;
            display: flex;
            flex-direction: column;
            align-items: center;
        }}
        .header {{
            width: 100%;
            background: #16213e;
            padding: 10px 20px;
            border-bottom: 1px solid #0f3460;
            font-size: 18px;
        }}
        #video {{
            margin-top: 20px;
            max-width: 100%;
            background: #000;
            border-radius: 8px;
            box-shadow: 0 4px 20px rgba(0,0,0,0.5);
        }}
        .controls {{
            margin: 16px;
            display: flex;
            gap: 8px;
        }}
        button {{
            background: #0f3460;
            color: #eee;
            border: none;
            border-radius: 4px;
            padding: 8px 14px;
            cursor: pointer;
        }}
        button:hover {{
            background: #e94560;
        }}
    </style>
</head>
<body>
    <div class="header">camp</div>
    <img id="video" alt="camera">
    <div class="controls">
        <button onclick="client.lessResolution()">分辨率 -</button>
        <button onclick="client.moreResolution()">分辨率 +</button>
        <button onclick="client.lessBrightness()">亮度 -</button>
        <button onclick="client.moreBrightness()">亮度 +</button>
    </div>
    <script src="/static/client.js"></script>
    <script>client.connect({port});</script>
</body>
</html>
"#, port = port)
}

/// 生成登录页面
pub fn login_page(error: bool) -> String {
    let banner = if error {
        r#"<div class="error">密码错误</div>"#
    } else {
        ""
    };

    format!(r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>camp - 登录</title>
    <style>
        body {{
            background: #1a1a2e;
            color: #eee;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            min-height: 100vh;
            display: flex;
            justify-content: center;
            align-items: center;
        }}
        form {{
            background: #16213e;
            padding: 24px;
            border-radius: 8px;
            display: flex;
            flex-direction: column;
            gap: 12px;
        }}
        .error {{
            color: #ff6b6b;
        }}
        input, button {{
            padding: 8px;
            border-radius: 4px;
            border: none;
        }}
    </style>
</head>
<body>
    <form method="post" action="/login">
        {banner}
        <input type="password" name="password" placeholder="密码" autofocus>
        <button type="submit">登录</button>
    </form>
</body>
</html>
"#, banner = banner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_page_embeds_port() {
        let html = viewer_page(8123);
        assert!(html.contains("client.connect(8123)"));
        assert!(html.contains("/static/client.js"));
    }

    #[test]
    fn test_login_page_error_banner() {
        assert!(login_page(true).contains("class=\"error\""));
        assert!(!login_page(false).contains("class=\"error\""));
        assert!(login_page(false).contains("name=\"password\""));
    }
}
