pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant specialized in company research for sales teams. Provide concise, factual information.";

pub fn company_overview(company_name: &str) -> String {
    format!(
        r#"Research the company "{company_name}" and provide a brief description, estimated number of employees, industry, and any recent news.

Base your answer on the search results below. If something cannot be determined from them, say so rather than guessing."#
    )
}

pub fn market_research(company_name: &str, product: &str, territory: &str) -> String {
    format!(
        r#"You are a seasoned sales researcher helping a young sales rep understand the market for {company_name}'s {product} in {territory}.

Your task:
1. Identify key reasons why businesses in {territory} are buying {product}.
2. Find specific pain points that {company_name} addresses for its customers.
3. Uncover any unique selling propositions that set {company_name} apart from competitors.
4. Discover success stories or case studies that demonstrate the value of {product}.
5. Determine the typical decision-makers involved in purchasing {product}.

Focus on actionable insights that will help the sales rep understand why customers buy and how to approach potential clients.

Provide a concise, bullet-point summary of your findings, organized by the tasks above. Here's the information we've gathered:"#
    )
}

pub fn ideal_customer_profile(company_name: &str, product: &str, territory: &str) -> String {
    format!(
        r#"You are an experienced sales coach mentoring a young sales representative. Based on the research about {company_name} and their {product} in {territory}, create an Ideal Customer Profile (ICP) that is practical and immediately usable in sales conversations.

Provide insights in exactly this format:

1. Customer Snapshot:
   - Briefly describe the ideal customer in one sentence.

2. Key Demographics:
   - Industry:
   - Company Size:
   - Annual Revenue:
   - Location:

3. Decision Maker Profile:
   - Title:
   - Key Responsibilities:
   - Pain Points:

4. Why They Buy:
   - List the top 3 reasons why this ideal customer chooses {company_name}'s {product}.

5. Common Objections:
   - List 2-3 objections this customer might have, and how to address them.

6. Conversation Starters:
   - Provide 3 questions the sales rep can ask to qualify a prospect.

7. Success Story:
   - Briefly describe a relevant customer success story that resonates with this ICP.

8. Competitive Edge:
   - Explain what sets {company_name} apart from competitors for this customer profile in {territory}."#
    )
}

/// Context block for the ICP call: research summary followed by raw search results.
pub fn research_context(research: &str, search_results: &str) -> String {
    format!("Research data:\n{research}\n\nAdditional search results:\n{search_results}")
}
