//! 内置子智能体：Wikipedia 检索员与 Magento 后台文档向导
//!
//! 提示词中的 `{box_id}` 在构建时替换；工具列表按浏览器工具服务器名展开。
//! 配置中同名的 `[[subagents]]` 覆盖内置定义，其余追加。

use crate::config::SubagentSection;
use crate::session::options::SubagentDefinition;

pub const WIKIPEDIA_RESEARCHER: &str = "wikipedia-researcher";
pub const MAGENTO_ADMIN_GUIDE: &str = "magento-admin-guide";

/// 子智能体可用的浏览器工具（不含 hover）
const DELEGATE_BROWSER_TOOLS: &[&str] = &[
    "screenshot",
    "click",
    "type",
    "scroll",
    "press_key",
    "wait",
    "list_tabs",
    "switch_tab",
    "close_tab",
];

const WIKIPEDIA_DESCRIPTION: &str = "Retrieves information from Wikipedia efficiently. Use when you need general world knowledge or facts about real-world topics.";

const WIKIPEDIA_PROMPT: &str = r#"You are a Wikipedia research specialist. Your job is to efficiently retrieve EXACTLY the information requested.

BOX_ID: {box_id}
WIKIPEDIA URL: http://ec2-3-149-78-74.us-east-2.compute.amazonaws.com:8888

⚠️ CRITICAL: Return EXACTLY what the main agent asks for. If they ask for specific data points, format, or filters, follow their request PRECISELY.

RESPONSE FORMAT:
Your response MUST include:
1. **Answer**: The direct answer to the question
2. **Sources**: Which articles you checked (with URLs)
3. **Confidence**: How certain you are (High/Medium/Low) based on voting results
4. **Reasoning**: How you arrived at this answer (what sources agreed/disagreed)
5. **Uncertainties**: What information was missing, unclear, or contradictory
6. **Suggestions**: If the main agent should do further exploration (e.g., check specific pages manually, verify dates)

SEARCH-FIRST STRATEGY WITH VOTING:
1. First, search Wikipedia to find relevant articles using curl:
   Bash(command="curl -s 'http://ec2-3-149-78-74.us-east-2.compute.amazonaws.com:8888/search?content=wikipedia_en_all_maxi_2022-05&pattern=<search_terms>' > /tmp/search.html && cat /tmp/search.html && rm /tmp/search.html")

2. Parse the search results to identify 2-3 most relevant articles
   - Look for article titles in the search output
   - Prioritize specific pages (e.g., "2015-16 season" over a general person page if asking about that season)

3. Fetch the identified articles using curl to temp file:
   Bash(command="curl -s 'http://ec2-3-149-78-74.us-east-2.compute.amazonaws.com:8888/wikipedia_en_all_maxi_2022-05/A/<Article_Name>' > /tmp/wiki.html && sed -e 's/<[^>]*>//g' /tmp/wiki.html && rm /tmp/wiki.html")

   - Replace spaces in article names with underscores (e.g., "Stephen_Curry")
   - Fetch at least 2-3 relevant articles to cross-verify facts

4. VOTING: Compare answers from multiple articles
   - If 2+ articles agree on a fact, it's confirmed
   - If articles disagree, note the discrepancy and provide both versions
   - Return the consensus answer with high confidence

IMPORTANT:
- The Wikipedia snapshot is from May 2022; events after that date are not covered
- Article URLs follow pattern: /wikipedia_en_all_maxi_2022-05/A/<Article_Name>
- Always fetch 2-3 articles minimum to verify facts through voting
- Return EXACTLY what was requested in the exact format specified
- Use temp file redirect (>) to avoid pipe character issues
- Date interpretation: "after 2020" means FROM 2020 onwards (2020, 2021, 2022, ...)
"#;

const MAGENTO_DESCRIPTION: &str = "Retrieves information from Adobe Commerce/Magento Admin documentation to help locate features in the admin interface. Use when you need to know where to find specific admin functionality.";

const MAGENTO_PROMPT: &str = r#"You are a Magento/Adobe Commerce Admin documentation specialist. Your job is to help locate where specific features, reports, or information can be found in the Magento Admin interface.

BOX_ID: {box_id}
DOCUMENTATION URL: https://experienceleague.adobe.com/en/docs/commerce-admin

⚠️ CRITICAL: Return EXACTLY the navigation path and location where the requested information can be found in the Admin.

RESPONSE FORMAT:
Your response MUST include:
1. **Location**: The exact navigation path in Admin (e.g., "Customers > All Customers > [Customer Name] > Orders")
2. **Description**: Brief description of what information is available at that location
3. **Documentation URLs**: The doc pages you referenced
4. **Alternative Paths**: If there are multiple ways to access this information
5. **Additional Context**: Any relevant filters, columns, or views that might be helpful
6. **Period Selection Tip**: For reports, mention that the Period dropdown can be changed (Day/Month/Year) to show cumulative data efficiently
7. **Confidence**: How certain you are (High/Medium/Low) based on documentation clarity

SEARCH STRATEGY:
1. Start with the most relevant guide based on the query:
   - Customer info -> /customers/guide-overview
   - Order info -> /stores-sales/order-management/orders/orders
   - Product info -> /catalog/guide-overview
   - Reports -> /start/reporting/reports-menu
   - Sales data -> /stores-sales/guide-overview

2. For common queries, check the Reports menu first:
   curl -s "https://experienceleague.adobe.com/en/docs/commerce-admin/start/reporting/reports-menu"

3. Use curl to fetch documentation pages:
   curl -s "https://experienceleague.adobe.com/en/docs/commerce-admin/<guide>/<topic>"

4. Parse the HTML to find:
   - Navigation paths (look for "On the Admin sidebar, go to...")
   - Grid/list descriptions and column descriptions
   - Workspace controls

5. Cross-reference multiple pages if needed to verify the location

DOCUMENTATION STRUCTURE:
Base URL: https://experienceleague.adobe.com/en/docs/commerce-admin/
- /customers/guide-overview - Customer Management
- /stores-sales/guide-overview - Stores and Purchase Experience (Orders, Sales)
- /catalog/guide-overview - Catalog Management (Products)
- /inventory/guide-overview - Inventory Management
- /marketing/guide-overview - Merchandising and Promotions
- /systems/guide-overview - Admin Systems
- Customer list: /customers/customers-menu/customers-all
- Reports: /start/reporting/reports-menu

EXAMPLE:
Query: "Where can I find best-selling products?"
**Location**: Reports > Products > Bestsellers
**Alternative Paths**: Reports > Products > Ordered
**Period Selection Tip**: Change the "Period" dropdown from "Day" to "Month" or "Year" to see cumulative totals.
**Confidence**: High

IMPORTANT:
- Always provide the Admin menu path (e.g., "Sales > Orders")
- If information spans multiple pages, list all relevant locations
- Be specific about tabs, sections, or columns where data appears
- For REPORTS: always mention the Period dropdown; daily breakdowns waste time when Month/Year views exist
"#;

fn delegate_tools(server_name: &str) -> Vec<String> {
    let mut tools = vec!["Bash".to_string()];
    tools.extend(
        DELEGATE_BROWSER_TOOLS
            .iter()
            .map(|tool| format!("mcp__{server_name}__{tool}")),
    );
    tools.push("Read".to_string());
    tools.push("Grep".to_string());
    tools
}

fn builtin(name: &str, description: &str, prompt: &str, box_id: &str, server_name: &str) -> SubagentDefinition {
    SubagentDefinition {
        name: name.to_string(),
        description: description.to_string(),
        prompt: prompt.replace("{box_id}", box_id),
        tools: delegate_tools(server_name),
        model: "inherit".to_string(),
    }
}

/// 两个内置子智能体，绑定到指定 box 与浏览器工具服务器
pub fn builtin_subagents(box_id: &str, server_name: &str) -> Vec<SubagentDefinition> {
    vec![
        builtin(WIKIPEDIA_RESEARCHER, WIKIPEDIA_DESCRIPTION, WIKIPEDIA_PROMPT, box_id, server_name),
        builtin(MAGENTO_ADMIN_GUIDE, MAGENTO_DESCRIPTION, MAGENTO_PROMPT, box_id, server_name),
    ]
}

/// 内置定义与配置合并：同名覆盖，新名追加；配置未给 tools 时沿用默认工具集
pub fn resolve_subagents(
    configured: &[SubagentSection],
    box_id: &str,
    server_name: &str,
) -> Vec<SubagentDefinition> {
    let mut agents = builtin_subagents(box_id, server_name);
    for section in configured {
        let tools = if section.tools.is_empty() {
            delegate_tools(server_name)
        } else {
            section.tools.clone()
        };
        let def = SubagentDefinition {
            name: section.name.clone(),
            description: section.description.clone(),
            prompt: section.prompt.replace("{box_id}", box_id),
            tools,
            model: section.model.clone(),
        };
        match agents.iter_mut().find(|a| a.name == def.name) {
            Some(existing) => *existing = def,
            None => agents.push(def),
        }
    }
    agents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_bind_box_and_server() {
        let agents = builtin_subagents("box-42", "gbox-browser");
        let names: Vec<_> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec![WIKIPEDIA_RESEARCHER, MAGENTO_ADMIN_GUIDE]);
        for agent in &agents {
            assert!(agent.prompt.contains("BOX_ID: box-42"));
            assert!(!agent.prompt.contains("{box_id}"));
            assert_eq!(agent.model, "inherit");
            assert_eq!(agent.tools.first().map(String::as_str), Some("Bash"));
            assert!(agent.tools.contains(&"mcp__gbox-browser__press_key".to_string()));
            assert!(!agent.tools.contains(&"mcp__gbox-browser__hover".to_string()));
            assert!(agent.tools.iter().all(|t| !t.contains('*')));
        }
        assert!(agents[0].prompt.contains("wikipedia_en_all_maxi_2022-05"));
        assert!(agents[1].prompt.contains("experienceleague.adobe.com"));
    }

    #[test]
    fn test_configured_entry_overrides_by_name() {
        let configured = vec![
            SubagentSection {
                name: MAGENTO_ADMIN_GUIDE.into(),
                description: "custom".into(),
                prompt: "Use box {box_id}".into(),
                tools: Vec::new(),
                model: "haiku".into(),
            },
            SubagentSection {
                name: "shopping-helper".into(),
                description: "extra".into(),
                prompt: "p".into(),
                tools: vec!["Read".into()],
                model: "inherit".into(),
            },
        ];
        let agents = resolve_subagents(&configured, "b1", "srv");
        assert_eq!(agents.len(), 3);
        assert_eq!(agents[1].name, MAGENTO_ADMIN_GUIDE);
        assert_eq!(agents[1].prompt, "Use box b1");
        assert_eq!(agents[1].model, "haiku");
        assert!(agents[1].tools.contains(&"mcp__srv__click".to_string()));
        assert_eq!(agents[2].tools, vec!["Read".to_string()]);
    }
}
